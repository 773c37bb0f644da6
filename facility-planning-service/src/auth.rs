//! Local identity layer over the key-value store.
//!
//! Behavior matches the modeled console: credentials are compared and
//! stored in plaintext. Hardening (hashing, salting) belongs behind this
//! seam so the orchestrator never sees the difference.

use regex::Regex;
use std::sync::{Arc, LazyLock};

use trace_flow::{FlowError, KvStore, Result, load_or, save};

use crate::models::User;
use crate::session::Theme;

pub mod store_keys {
    pub const REGISTERED_USERS: &str = "registered_users";
    pub const CURRENT_USER: &str = "current_user";
    pub const THEME: &str = "theme";
}

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern"));

pub struct AuthStore {
    kv: Arc<dyn KvStore>,
}

impl AuthStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn registered_users(&self) -> Vec<User> {
        load_or(self.kv.as_ref(), store_keys::REGISTERED_USERS, Vec::new())
    }

    pub fn current_user(&self) -> Option<User> {
        load_or(self.kv.as_ref(), store_keys::CURRENT_USER, None)
    }

    /// Validate and enroll a new operator, opening their session.
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        if name.trim().chars().count() < 3 {
            return Err(FlowError::Validation(
                "Designation must be at least 3 characters.".to_string(),
            ));
        }
        if !EMAIL_SHAPE.is_match(email) {
            return Err(FlowError::Validation(
                "Enter a valid email sequence.".to_string(),
            ));
        }
        if password.chars().count() < 6 {
            return Err(FlowError::Validation(
                "Password must be at least 6 characters.".to_string(),
            ));
        }
        let mut registry = self.registered_users();
        if registry.iter().any(|u| u.email == email) {
            return Err(FlowError::Validation(
                "This email sequence is already in the database.".to_string(),
            ));
        }

        let user = User::new(name.trim(), email, password);
        registry.push(user.clone());
        save(self.kv.as_ref(), store_keys::REGISTERED_USERS, &registry)?;
        save(self.kv.as_ref(), store_keys::CURRENT_USER, &Some(&user))?;
        Ok(user)
    }

    /// Exact email + password match against the registry.
    pub fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .registered_users()
            .into_iter()
            .find(|u| u.email == email && u.password == password)
            .ok_or_else(|| {
                FlowError::Validation("Invalid credentials. Identity check failed.".to_string())
            })?;
        save(self.kv.as_ref(), store_keys::CURRENT_USER, &Some(&user))?;
        Ok(user)
    }

    /// Close the session. The registry entry persists.
    pub fn logout(&self) -> Result<()> {
        self.kv.remove(store_keys::CURRENT_USER)
    }

    /// Write-through for a mutated user: replace the registry entry keyed
    /// by email and mirror the open session in the same operation.
    pub fn persist_user(&self, user: &User) -> Result<()> {
        let mut registry = self.registered_users();
        match registry.iter_mut().find(|u| u.email == user.email) {
            Some(entry) => *entry = user.clone(),
            None => registry.push(user.clone()),
        }
        save(self.kv.as_ref(), store_keys::REGISTERED_USERS, &registry)?;
        save(self.kv.as_ref(), store_keys::CURRENT_USER, &Some(user))
    }

    pub fn theme(&self) -> Theme {
        load_or(self.kv.as_ref(), store_keys::THEME, Theme::default())
    }

    pub fn save_theme(&self, theme: Theme) -> Result<()> {
        save(self.kv.as_ref(), store_keys::THEME, &theme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_flow::InMemoryKvStore;

    fn auth() -> AuthStore {
        AuthStore::new(Arc::new(InMemoryKvStore::new()))
    }

    #[test]
    fn register_creates_user_with_empty_projects() {
        let auth = auth();
        let user = auth.register("Ama", "ama@x.com", "secret1").unwrap();
        assert_eq!(user.name, "Ama");
        assert!(user.projects.is_empty());

        let registry = auth.registered_users();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[0].email, "ama@x.com");
        assert_eq!(auth.current_user().unwrap().email, "ama@x.com");
    }

    #[test]
    fn register_rejects_bad_input_without_mutating() {
        let auth = auth();
        assert!(auth.register("Al", "al@x.com", "secret1").is_err());
        assert!(auth.register("Alice", "not-an-email", "secret1").is_err());
        assert!(auth.register("Alice", "alice@x.com", "short").is_err());
        assert!(auth.registered_users().is_empty());
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let auth = auth();
        auth.register("Ama", "ama@x.com", "secret1").unwrap();
        let err = auth.register("Ama Again", "ama@x.com", "secret2");
        assert!(matches!(err, Err(FlowError::Validation(_))));
        assert_eq!(auth.registered_users().len(), 1);
    }

    #[test]
    fn relogin_is_idempotent() {
        let auth = auth();
        let registered = auth.register("Ama", "ama@x.com", "secret1").unwrap();
        let first = auth.login("ama@x.com", "secret1").unwrap();
        let second = auth.login("ama@x.com", "secret1").unwrap();
        assert_eq!(first, registered);
        assert_eq!(first, second);
        assert_eq!(auth.registered_users().len(), 1);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let auth = auth();
        auth.register("Ama", "ama@x.com", "secret1").unwrap();
        assert!(auth.login("ama@x.com", "wrong").is_err());
    }

    #[test]
    fn logout_clears_session_but_keeps_registry() {
        let auth = auth();
        auth.register("Ama", "ama@x.com", "secret1").unwrap();
        auth.logout().unwrap();
        assert!(auth.current_user().is_none());
        assert_eq!(auth.registered_users().len(), 1);
    }

    #[test]
    fn persist_user_replaces_registry_entry() {
        let auth = auth();
        let mut user = auth.register("Ama", "ama@x.com", "secret1").unwrap();
        user.projects.push(crate::models::UserProject::new(
            "Northern Sweep",
            Vec::new(),
            Vec::new(),
            None,
        ));
        auth.persist_user(&user).unwrap();

        let registry = auth.registered_users();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[0].projects.len(), 1);
        assert_eq!(auth.current_user().unwrap().projects.len(), 1);
    }
}
