//! legacy exit status codes for system programs.
//! reference: [SYSEXITS](https://man.freebsd.org/cgi/man.cgi?query=sysexits&apropos=0&sektion=0&manpath=FreeBSD+11.2-stable&arch=default&format=html)

/// value: 64 <br>
/// The command was used incorrectly, e.g., with the wrong number of arguments, a bad flag, a bad syntax in a parameter, etc.
pub const EX_USAGE: i32 = 64;

/// value: 65 <br>
/// The input data was incorrect in some way. Used when two trees or files do not match.
pub const EX_DATAERR: i32 = 65;

/// value: 66 <br>
/// An input file (not a system file) did not exist or was not readable.
pub const EX_NOINPUT: i32 = 66;

/// value: 69 <br>
/// A service is unavailable. Used for Telegram API failures and commands that exit non-zero.
pub const EX_UNAVAILABLE: i32 = 69;

/// value: 70 <br>
/// An internal software error has been detected.
pub const EX_SOFTWARE: i32 = 70;

/// value: 73 <br>
/// A (user specified) output file cannot be created.
pub const EX_CANTCREAT: i32 = 73;

/// value: 74 <br>
/// An error occurred while doing I/O on some file.
pub const EX_IOERR: i32 = 74;

/// value: 75 <br>
/// Temporary failure. Used when a command runs past its timeout.
pub const EX_TEMPFAIL: i32 = 75;

/// value: 78 <br>
/// Something was found in an unconfigured or misconfigured state.
pub const EX_CONFIG: i32 = 78;
