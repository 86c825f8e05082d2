//! In-memory user, session and message storage with optional JSON snapshot.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{ChatConfig, StorageConfig};
use crate::services::{IdentityResolver, MessageRecord, MessageStore, StoreError, XsrfValidator};

const PASSWORD_SPECIALS: &str = "!@#$%^&()-_=";
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    salt: String,
    hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    users: HashMap<String, UserRecord>,
    sessions: HashMap<String, String>,
    xsrf_tokens: HashMap<String, String>,
    messages: Vec<MessageRecord>,
}

/// Tokens issued by a successful login.
#[derive(Debug, Clone)]
pub struct LoginTokens {
    pub auth_token: String,
    pub xsrf_token: String,
}

/// Users, sessions, XSRF tokens and chat history.
#[derive(Debug)]
pub struct Storage {
    users: DashMap<String, UserRecord>,
    /// SHA-256 of the session token → username.
    sessions: DashMap<String, String>,
    xsrf_tokens: DashMap<String, String>,
    messages: RwLock<Vec<MessageRecord>>,
    max_message_len: usize,
    snapshot_path: Option<PathBuf>,
}

impl Storage {
    /// Create an empty, memory-only store.
    pub fn new(max_message_len: usize) -> Self {
        Self {
            users: DashMap::new(),
            sessions: DashMap::new(),
            xsrf_tokens: DashMap::new(),
            messages: RwLock::new(Vec::new()),
            max_message_len,
            snapshot_path: None,
        }
    }

    /// Open the store, loading the snapshot if one is configured and present.
    pub fn open(storage: &StorageConfig, chat: &ChatConfig) -> Result<Self, StoreError> {
        let mut store = Self::new(chat.max_message_len);
        let Some(path) = storage.snapshot_path.as_ref().map(PathBuf::from) else {
            return Ok(store);
        };

        if path.exists() {
            let snapshot: Snapshot = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
            store.restore(snapshot);
            tracing::info!(
                path = %path.display(),
                users = store.users.len(),
                messages = store.message_count(),
                "Loaded storage snapshot"
            );
        }
        store.snapshot_path = Some(path);
        Ok(store)
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.users.extend(snapshot.users);
        self.sessions.extend(snapshot.sessions);
        self.xsrf_tokens.extend(snapshot.xsrf_tokens);
        *self.messages.get_mut().unwrap_or_else(PoisonError::into_inner) = snapshot.messages;
    }

    /// Flush the snapshot, if configured.
    pub fn close(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        self.save_to(path)?;
        tracing::info!(path = %path.display(), "Saved storage snapshot");
        Ok(())
    }

    fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            users: collect(&self.users),
            sessions: collect(&self.sessions),
            xsrf_tokens: collect(&self.xsrf_tokens),
            messages: self.list_messages(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &snapshot)?;
        Ok(())
    }

    pub fn register_user(&self, username: &str, password: &str) -> Result<(), StoreError> {
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::MissingCredentials);
        }

        match self.users.entry(escape_html(username)) {
            Entry::Occupied(_) => Err(StoreError::UsernameTaken),
            Entry::Vacant(slot) => {
                if !validate_password(password) {
                    return Err(StoreError::WeakPassword);
                }
                let salt = Uuid::new_v4().simple().to_string();
                let hash = hash_password(&salt, password);
                tracing::info!(username = %slot.key(), "User registered");
                slot.insert(UserRecord { salt, hash });
                Ok(())
            }
        }
    }

    /// Check credentials and open a session. The session is bound to the
    /// name as typed; only stored records carry the escaped form.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginTokens, StoreError> {
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::MissingCredentials);
        }

        let verified = self
            .users
            .get(&escape_html(username))
            .is_some_and(|user| hash_password(&user.salt, password) == user.hash);
        if !verified {
            tracing::debug!(%username, "Login rejected");
            return Err(StoreError::InvalidCredentials);
        }

        let auth_token = Uuid::new_v4().to_string();
        let xsrf_token = Uuid::new_v4().to_string();
        self.sessions.insert(token_hash(&auth_token), username.to_string());
        self.xsrf_tokens.insert(username.to_string(), xsrf_token.clone());
        tracing::info!(%username, "Session opened");

        Ok(LoginTokens { auth_token, xsrf_token })
    }

    /// End the session for a token. Returns whether one existed.
    pub fn logout(&self, auth_token: &str) -> bool {
        self.sessions.remove(&token_hash(auth_token)).is_some()
    }

    pub fn xsrf_token_for(&self, username: &str) -> Option<String> {
        self.xsrf_tokens.get(username).map(|t| t.value().clone())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl IdentityResolver for Storage {
    fn resolve_identity(&self, token: &str) -> Option<String> {
        self.sessions.get(&token_hash(token)).map(|u| u.value().clone())
    }
}

impl XsrfValidator for Storage {
    fn validate_cross_site_token(&self, identity: &str, token: &str) -> bool {
        self.xsrf_tokens
            .get(identity)
            .is_some_and(|stored| !token.is_empty() && stored.value() == token)
    }
}

impl MessageStore for Storage {
    fn persist_message(
        &self,
        username: &str,
        text: &str,
        media: Option<serde_json::Value>,
    ) -> Result<MessageRecord, StoreError> {
        let media = media.filter(|m| !m.is_null());
        if text.is_empty() && media.is_none() {
            return Err(StoreError::EmptyMessage);
        }
        if text.chars().count() > self.max_message_len {
            return Err(StoreError::MessageTooLong {
                max: self.max_message_len,
            });
        }

        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            username: escape_html(username),
            message: escape_html(text),
            media,
        };
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }

    fn list_messages(&self) -> Vec<MessageRecord> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn delete_message(&self, id: &str, username: &str) -> Result<(), StoreError> {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        let index = messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(StoreError::MessageNotFound)?;
        if messages[index].username != escape_html(username) {
            return Err(StoreError::NotOwner);
        }
        messages.remove(index);
        Ok(())
    }
}

/// At least eight characters with an upper-case letter, a lower-case letter,
/// a digit and one of `!@#$%^&()-_=`.
pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c))
}

/// Escape `& < > " '` for safe embedding in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn hash_password(salt: &str, password: &str) -> String {
    hex_digest(&[salt.as_bytes(), password.as_bytes()])
}

fn token_hash(token: &str) -> String {
    hex_digest(&[token.as_bytes()])
}

fn hex_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn collect<V: Clone>(map: &DashMap<String, V>) -> HashMap<String, V> {
    map.iter().map(|r| (r.key().clone(), r.value().clone())).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> Storage {
        Storage::new(5000)
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("Pass123!"));
        assert!(validate_password("Aa1!@#$%"));
        assert!(validate_password("Bb2^&()-"));
        assert!(validate_password("Cc3_=567"));

        assert!(!validate_password("Pass12!"));
        assert!(!validate_password("pass123!"));
        assert!(!validate_password("PASS123!"));
        assert!(!validate_password("Password!"));
        assert!(!validate_password("Password1"));
        assert!(!validate_password("Password1*"));
    }

    #[test]
    fn escapes_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn register_login_resolve_logout() {
        let store = store();
        store.register_user("alice", "Secret1!").unwrap();
        assert!(matches!(store.register_user("alice", "Secret1!"), Err(StoreError::UsernameTaken)));
        assert!(matches!(store.register_user("bob", "weak"), Err(StoreError::WeakPassword)));
        assert!(matches!(store.register_user("", "Secret1!"), Err(StoreError::MissingCredentials)));

        assert!(matches!(store.login("alice", "Wrong1!!"), Err(StoreError::InvalidCredentials)));
        assert!(matches!(store.login("nobody", "Secret1!"), Err(StoreError::InvalidCredentials)));

        let tokens = store.login("alice", "Secret1!").unwrap();
        assert_eq!(store.resolve_identity(&tokens.auth_token).as_deref(), Some("alice"));
        assert!(store.validate_cross_site_token("alice", &tokens.xsrf_token));
        assert!(!store.validate_cross_site_token("alice", "forged"));
        assert!(!store.validate_cross_site_token("bob", &tokens.xsrf_token));

        assert!(store.logout(&tokens.auth_token));
        assert!(!store.logout(&tokens.auth_token));
        assert!(store.resolve_identity(&tokens.auth_token).is_none());
    }

    #[test]
    fn markup_in_usernames_is_escaped_once() {
        let store = store();
        store.register_user("tom&<jerry>", "Secret1!").unwrap();
        let tokens = store.login("tom&<jerry>", "Secret1!").unwrap();

        let identity = store.resolve_identity(&tokens.auth_token).unwrap();
        assert_eq!(identity, "tom&<jerry>");
        assert!(store.validate_cross_site_token(&identity, &tokens.xsrf_token));

        let record = store.persist_message(&identity, "hi", None).unwrap();
        assert_eq!(record.username, "tom&amp;&lt;jerry&gt;");

        assert!(matches!(store.delete_message(&record.id, "tom"), Err(StoreError::NotOwner)));
        store.delete_message(&record.id, &identity).unwrap();
    }

    #[test]
    fn sessions_are_stored_hashed() {
        let store = store();
        store.register_user("alice", "Secret1!").unwrap();
        let tokens = store.login("alice", "Secret1!").unwrap();
        assert!(!store.sessions.contains_key(&tokens.auth_token));
        assert!(store.sessions.contains_key(&token_hash(&tokens.auth_token)));
    }

    #[test]
    fn persist_escapes_and_validates() {
        let store = Storage::new(10);

        let record = store.persist_message("guest", "<hi>", None).unwrap();
        assert_eq!(record.message, "&lt;hi&gt;");
        assert_eq!(record.username, "guest");

        let media = json!({"url": "/uploads/x.png", "type": "image/png"});
        let with_media = store.persist_message("alice", "", Some(media.clone())).unwrap();
        assert_eq!(with_media.media, Some(media));

        assert!(matches!(store.persist_message("alice", "", None), Err(StoreError::EmptyMessage)));
        assert!(matches!(
            store.persist_message("alice", "", Some(serde_json::Value::Null)),
            Err(StoreError::EmptyMessage)
        ));
        assert!(matches!(
            store.persist_message("alice", "01234567890", None),
            Err(StoreError::MessageTooLong { max: 10 })
        ));

        let ids: Vec<_> = store.list_messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![record.id, with_media.id]);
    }

    #[test]
    fn delete_checks_owner() {
        let store = store();
        let record = store.persist_message("alice", "hello", None).unwrap();

        assert!(matches!(store.delete_message("missing", "alice"), Err(StoreError::MessageNotFound)));
        assert!(matches!(store.delete_message(&record.id, "bob"), Err(StoreError::NotOwner)));
        store.delete_message(&record.id, "alice").unwrap();
        assert_eq!(store.message_count(), 0);
    }

    #[test]
    fn snapshot_round_trip() {
        let path = std::env::temp_dir().join(format!("chat-storage-{}.json", Uuid::new_v4()));
        let config = StorageConfig {
            snapshot_path: Some(path.to_string_lossy().into_owned()),
        };
        let chat = ChatConfig::default();

        let store = Storage::open(&config, &chat).unwrap();
        store.register_user("alice", "Secret1!").unwrap();
        let tokens = store.login("alice", "Secret1!").unwrap();
        store.persist_message("alice", "persisted", None).unwrap();
        store.close().unwrap();

        let reopened = Storage::open(&config, &chat).unwrap();
        assert_eq!(reopened.user_count(), 1);
        assert_eq!(reopened.resolve_identity(&tokens.auth_token).as_deref(), Some("alice"));
        assert_eq!(reopened.list_messages()[0].message, "persisted");
        assert!(reopened.login("alice", "Secret1!").is_ok());

        std::fs::remove_file(path).unwrap_or_default();
    }
}
