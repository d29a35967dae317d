//! Telegram bot notification channel.
//!
//! Only the two Bot API calls labkit needs are wrapped: `getUpdates` to read
//! what was sent to the bot and `sendMessage` to notify the configured chat.

use crate::config::Common;
use crate::constants::TELEGRAM_TOKEN_ENV;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing::{debug, info};

/// Default Bot API endpoint.
pub const API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("variable {0} doesn't exist")]
    MissingToken(&'static str),
    #[error("variable {0} is empty")]
    EmptyToken(&'static str),
    #[error("request to {method} failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("couldn't decode the {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{method} returned a response that is not ok: {description}")]
    NotOk {
        method: &'static str,
        description: String,
    },
    #[error("couldn't find any messages in the chat")]
    NoMessages,
}

/// Body of a `getUpdates` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesBody {
    pub ok: bool,
    #[serde(default)]
    pub result: Vec<Update>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    /// Absent for update kinds other than plain messages.
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiStatus {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// A bot bound to one chat.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    chat_id: i64,
    max_characters: usize,
}

impl TelegramClient {
    pub fn new(token: &str, chat_id: i64, max_characters: usize) -> Self {
        Self::with_api_url(API_URL, token, chat_id, max_characters)
    }

    /// Same as [`TelegramClient::new`] against another Bot API endpoint.
    pub fn with_api_url(api_url: &str, token: &str, chat_id: i64, max_characters: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            chat_id,
            max_characters,
        }
    }

    /// Builds a client for the configured chat, with the token taken from `TELEGRAM_TOKEN`.
    pub fn from_env(common: &Common) -> Result<Self, TelegramError> {
        let token = token_from_env()?;
        Ok(Self::new(
            &token,
            common.telegram_chat_id,
            common.telegram_max_characters,
        ))
    }

    /// URL of a Bot API method.
    pub fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn post<B: Serialize>(
        &self,
        method: &'static str,
        body: Option<&B>,
    ) -> Result<String, TelegramError> {
        let mut request = self.client.post(self.url(method));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|source| TelegramError::Http { method, source })?;
        let text = response
            .text()
            .await
            .map_err(|source| TelegramError::Http { method, source })?;
        debug!("{method} response body -> {text}");
        Ok(text)
    }

    /// Fetches the pending updates of the bot.
    pub async fn get_updates(&self) -> Result<UpdatesBody, TelegramError> {
        const METHOD: &str = "getUpdates";
        let text = self.post::<()>(METHOD, None).await?;
        let body: UpdatesBody = serde_json::from_str(&text).map_err(|source| {
            TelegramError::Decode {
                method: METHOD,
                source,
            }
        })?;
        if !body.ok {
            return Err(TelegramError::NotOk {
                method: METHOD,
                description: body.description.unwrap_or_default(),
            });
        }
        Ok(body)
    }

    /// Text of the most recent message sent to the bot.
    pub async fn last_message(&self) -> Result<String, TelegramError> {
        let body = self.get_updates().await?;
        body.result
            .into_iter()
            .rev()
            .find_map(|update| update.message.and_then(|m| m.text))
            .ok_or(TelegramError::NoMessages)
    }

    /// Sends `text` to the configured chat, split into as many messages as
    /// the character limit requires. Returns the number of messages sent.
    pub async fn send_message(&self, text: &str) -> Result<usize, TelegramError> {
        const METHOD: &str = "sendMessage";
        let chunks = split_message(text, self.max_characters);
        for chunk in &chunks {
            let body = SendMessage {
                chat_id: self.chat_id,
                text: chunk,
            };
            let response = self.post(METHOD, Some(&body)).await?;
            let status: ApiStatus = serde_json::from_str(&response).map_err(|source| {
                TelegramError::Decode {
                    method: METHOD,
                    source,
                }
            })?;
            if !status.ok {
                return Err(TelegramError::NotOk {
                    method: METHOD,
                    description: status.description.unwrap_or_default(),
                });
            }
        }
        info!("Sent {} message(s) to chat {}", chunks.len(), self.chat_id);
        Ok(chunks.len())
    }
}

fn token_from_env() -> Result<String, TelegramError> {
    let token =
        env::var(TELEGRAM_TOKEN_ENV).map_err(|_| TelegramError::MissingToken(TELEGRAM_TOKEN_ENV))?;
    if token.trim().is_empty() {
        return Err(TelegramError::EmptyToken(TELEGRAM_TOKEN_ENV));
    }
    Ok(token)
}

/// Splits `text` into chunks of at most `max_characters` characters.
///
/// A limit of zero disables splitting.
pub fn split_message(text: &str, max_characters: usize) -> Vec<String> {
    if max_characters == 0 || text.chars().count() <= max_characters {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_characters)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
