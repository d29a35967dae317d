use assert_cmd::prelude::*;
use assert_fs::fixture::*;
use assert_fs::assert::PathAssert;
use predicates::prelude::*;
use std::process::Command;

const CONFIG: &str = r#"
[common]
project_name = "cyberhomelab"
package_name = "core"
log_to_file = false
log_file = "/var/log/labkit.log"
log_level = "info"
telegram_chat_id = 123456
telegram_max_characters = 4096
nextcloud_hostname = "cloud.example.org"
nextcloud_directory = "/backups"
backup = ["/etc/hosts"]

[nodes.mars]
service_directory = "/opt/services"
user_ssh_key = "/home/user/.ssh/id_ed25519"
root_ssh_key = "/root/.ssh/id_ed25519"
log_directory = "/var/log/services"
network_interface = "eth0"
firewall_rules = ["allow 22/tcp"]
backup = ["/opt/services"]
"#;

fn lk(dir: &assert_fs::TempDir) -> Result<Command, Box<dyn std::error::Error>> {
    let config = dir.child("config.toml");
    if !config.exists() {
        config.write_str(CONFIG)?;
    }
    let mut cmd = Command::cargo_bin("lk")?;
    cmd.env_remove("LABKIT_CONFIG")
        .env_remove("TELEGRAM_TOKEN")
        .arg("--config")
        .arg(config.path());
    Ok(cmd)
}

#[test]
fn no_command() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("lk")?
        .assert()
        .code(64)
        .stderr(predicate::str::contains("at least one command"));
    Ok(())
}

#[test]
fn hash() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let file = dir.child("sample.txt");
    file.write_str("hello\n")?;

    lk(&dir)?
        .arg("hash")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03  ",
        ));
    Ok(())
}

#[test]
fn copy_and_verify() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let src = dir.child("src");
    src.child("a.txt").write_str("A test\nActual content")?;
    src.child("sub").child("b.txt").write_str("More content")?;
    let dest = dir.child("dest");

    lk(&dir)?
        .arg("copy")
        .arg("--verify")
        .arg(src.path())
        .arg(dest.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("matches"));
    dest.child("sub")
        .child("b.txt")
        .assert(predicate::str::diff("More content"));

    lk(&dir)?
        .arg("copy")
        .arg(src.path())
        .arg(dest.path())
        .assert()
        .code(73)
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn verify_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let a = dir.child("a.txt");
    a.write_str("one")?;
    let b = dir.child("b.txt");
    b.write_str("two")?;

    lk(&dir)?
        .arg("verify")
        .arg(a.path())
        .arg(b.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains("hash"));
    Ok(())
}

#[test]
fn file_doesnt_exist() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    lk(&dir)?
        .arg("hash")
        .arg(dir.child("foo").child("bar").path())
        .assert()
        .code(66)
        .stderr(predicate::str::contains("No such file or directory"));
    Ok(())
}

#[test]
fn archive_and_list() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let data = dir.child("data");
    data.child("notes.txt").write_str("notes")?;
    let output = dir.child("out.tar.gz");

    lk(&dir)?
        .arg("archive")
        .arg(output.path())
        .arg(data.path())
        .assert()
        .success();
    output.assert(predicate::path::is_file());

    lk(&dir)?
        .arg("archive")
        .arg("--list")
        .arg(output.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("data\ndata/notes.txt\n"));
    Ok(())
}

#[test]
fn exec() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    lk(&dir)?
        .args(["exec", "echo", "-n", "homelab"])
        .assert()
        .success()
        .stdout(predicate::str::diff("homelab"));

    lk(&dir)?
        .args(["exec", "--timeout", "1", "sleep", "5"])
        .assert()
        .code(75)
        .stderr(predicate::str::contains("timed out"));
    Ok(())
}

#[test]
fn invalid_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    dir.child("config.toml")
        .write_str(&CONFIG.replace("network_interface = \"eth0\"", ""))?;

    lk(&dir)?
        .args(["hash", "/etc/hostname"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("nodes.mars.network_interface"));

    lk(&dir)?
        .args(["config", "--check"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("nodes.mars.network_interface"));
    Ok(())
}

#[test]
fn config_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    lk(&dir)?
        .args(["config", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml").and(predicate::str::contains("config is valid")));
    Ok(())
}

#[test]
fn notify_without_token() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    lk(&dir)?
        .args(["notify", "hello"])
        .assert()
        .code(69)
        .stderr(predicate::str::contains("TELEGRAM_TOKEN"));
    Ok(())
}

#[test]
fn backup() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let app_conf = dir.child("app.conf");
    app_conf.write_str("port = 8080\n")?;
    let services = dir.child("services");
    services.child("compose.yml").write_str("services: {}")?;
    dir.child("config.toml").write_str(
        &CONFIG
            .replace(
                r#"backup = ["/etc/hosts"]"#,
                &format!("backup = [\"{}\"]", app_conf.path().display()),
            )
            .replace(
                r#"backup = ["/opt/services"]"#,
                &format!("backup = [\"{}\"]", services.path().display()),
            ),
    )?;
    let output_dir = dir.child("out").child("nested");

    lk(&dir)?
        .arg("backup")
        .arg("mars")
        .arg("--output-dir")
        .arg(output_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("mars-"));

    let archives: Vec<_> = std::fs::read_dir(output_dir.path())?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    assert_eq!(archives.len(), 1);
    let name = archives[0].file_name().unwrap().to_string_lossy().to_string();
    let stamp = name
        .strip_prefix("mars-")
        .and_then(|rest| rest.strip_suffix(".tar.gz"))
        .unwrap();
    assert!(stamp.parse::<u64>().is_ok(), "unexpected archive name {name}");

    lk(&dir)?
        .arg("archive")
        .arg("--list")
        .arg(&archives[0])
        .assert()
        .success()
        .stdout(predicate::str::diff("app.conf\nservices\nservices/compose.yml\n"));

    lk(&dir)?
        .args(["backup", "venus", "--output-dir"])
        .arg(output_dir.path())
        .assert()
        .code(78)
        .stderr(predicate::str::contains("node venus is not defined"));
    Ok(())
}

#[test]
fn archive_current_directory() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let data = dir.child("data");
    data.child("notes.txt").write_str("notes")?;
    let output = dir.child("out.tar.gz");

    lk(&dir)?
        .current_dir(data.path())
        .arg("archive")
        .arg(output.path())
        .arg(".")
        .assert()
        .success();

    lk(&dir)?
        .arg("archive")
        .arg("--list")
        .arg(output.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("data\ndata/notes.txt\n"));
    Ok(())
}

#[test]
fn error_reported_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let a = dir.child("a.txt");
    a.write_str("one")?;
    let b = dir.child("b.txt");
    b.write_str("two")?;

    let output = lk(&dir)?.arg("verify").arg(a.path()).arg(b.path()).output()?;
    assert_eq!(output.status.code(), Some(65));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("hash mismatch").count(), 1, "{stderr}");
    Ok(())
}

#[test]
fn config_path_is_absolute() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    dir.child("config.toml").write_str(CONFIG)?;

    let output = Command::cargo_bin("lk")?
        .env_remove("LABKIT_CONFIG")
        .current_dir(dir.path())
        .args(["--config", "config.toml", "config"])
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let shown = stdout.trim().strip_prefix("config file: ").unwrap();
    assert!(std::path::Path::new(shown).is_absolute(), "{shown}");
    assert!(shown.ends_with("/config.toml"));
    Ok(())
}
