//! Test utilities: an in-memory [`AuthRepository`] with call counters, and fixture builders.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    config::Config,
    db::{
        errors::{DbError, Result},
        handlers::AuthRepository,
        models::{
            organizations::Organization,
            users::{LoginUser, User},
        },
    },
    types::{GroupId, UserId},
};

/// Number of times each repository method has been called.
#[derive(Debug, Default)]
pub struct CallCounters {
    pub user_by_token: AtomicUsize,
    pub group_names: AtomicUsize,
    pub permission_names: AtomicUsize,
    pub organization: AtomicUsize,
    pub update_last_login: AtomicUsize,
    pub login_user_by_email: AtomicUsize,
    pub rotate_token: AtomicUsize,
    pub clear_token: AtomicUsize,
}

impl CallCounters {
    pub fn user_by_token(&self) -> usize {
        self.user_by_token.load(Ordering::SeqCst)
    }

    pub fn group_names(&self) -> usize {
        self.group_names.load(Ordering::SeqCst)
    }

    pub fn permission_names(&self) -> usize {
        self.permission_names.load(Ordering::SeqCst)
    }

    pub fn organization(&self) -> usize {
        self.organization.load(Ordering::SeqCst)
    }

    pub fn update_last_login(&self) -> usize {
        self.update_last_login.load(Ordering::SeqCst)
    }

    pub fn rotate_token(&self) -> usize {
        self.rotate_token.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct MockState {
    users: HashMap<UserId, LoginUser>,
    /// group id -> group name
    groups: HashMap<GroupId, String>,
    /// group name -> permission names the group grants
    group_permissions: HashMap<String, Vec<String>>,
    permissions: HashSet<String>,
    user_groups: HashMap<UserId, Vec<String>>,
    user_permissions: HashMap<UserId, Vec<String>>,
    organizations: HashMap<UserId, Organization>,
}

/// In-memory stand-in for the Postgres repository.
#[derive(Debug, Default)]
pub struct MockRepository {
    state: Mutex<MockState>,
    pub calls: CallCounters,
    fail_lookups: AtomicBool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every load call fail with a database error until reset.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("connection refused")));
        }
        Ok(())
    }

    pub fn add_user(&self, user: User) {
        self.add_login_user(user, None, None);
    }

    pub fn add_login_user(&self, user: User, password_hash: Option<String>, two_factor_secret: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            user.id,
            LoginUser {
                user,
                password_hash,
                two_factor_secret,
            },
        );
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.state.lock().unwrap().users.get(&id).map(|u| u.user.clone())
    }

    /// Register a group with the permissions it grants. Returns its id.
    pub fn add_group(&self, name: &str, permissions: &[&str]) -> GroupId {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        state.groups.insert(id, name.to_string());
        state
            .group_permissions
            .insert(name.to_string(), permissions.iter().map(|p| p.to_string()).collect());
        state.permissions.extend(permissions.iter().map(|p| p.to_string()));
        id
    }

    pub fn add_permission(&self, name: &str) {
        self.state.lock().unwrap().permissions.insert(name.to_string());
    }

    pub fn add_user_to_group(&self, user_id: UserId, group: &str) {
        self.state
            .lock()
            .unwrap()
            .user_groups
            .entry(user_id)
            .or_default()
            .push(group.to_string());
    }

    pub fn grant_permission(&self, user_id: UserId, permission: &str) {
        let mut state = self.state.lock().unwrap();
        state.permissions.insert(permission.to_string());
        state.user_permissions.entry(user_id).or_default().push(permission.to_string());
    }

    pub fn link_organization(&self, user_id: UserId, name: &str) -> Organization {
        let organization = Organization {
            id: Uuid::new_v4(),
            organization_name: name.to_string(),
            email: None,
            created_at: Utc::now(),
        };
        self.join_organization(user_id, &organization);
        organization
    }

    /// Link `user_id` to an organization created earlier with [`Self::link_organization`].
    pub fn join_organization(&self, user_id: UserId, organization: &Organization) {
        self.state.lock().unwrap().organizations.insert(user_id, organization.clone());
    }

    fn unknown(entity_type: &str, names: Vec<String>) -> DbError {
        DbError::UnknownReference {
            entity_type: entity_type.to_string(),
            names,
        }
    }
}

#[async_trait]
impl AuthRepository for MockRepository {
    async fn load_user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.calls.user_by_token.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .values()
            .find(|u| u.user.token.as_deref() == Some(token))
            .map(|u| u.user.clone()))
    }

    async fn load_group_names_by_user_id(&self, id: UserId) -> Result<Vec<String>> {
        self.calls.group_names.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        let mut names = state.user_groups.get(&id).cloned().unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn load_permission_names_by_user_id(&self, id: UserId) -> Result<Vec<String>> {
        self.calls.permission_names.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.user_permissions.get(&id).cloned().unwrap_or_default();
        for group in state.user_groups.get(&id).into_iter().flatten() {
            names.extend(state.group_permissions.get(group).into_iter().flatten().cloned());
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn load_organization_by_user_id(&self, id: UserId) -> Result<Option<Organization>> {
        self.calls.organization.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.state.lock().unwrap().organizations.get(&id).cloned())
    }

    async fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        self.calls.update_last_login.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let entry = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        entry.user.last_login = Some(at);
        Ok(entry.user.clone())
    }

    async fn load_login_user_by_email(&self, email: &str) -> Result<Option<LoginUser>> {
        self.calls.login_user_by_email.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        Ok(state.users.values().find(|u| u.user.email == email).cloned())
    }

    async fn rotate_token(&self, id: UserId, token: &str, at: DateTime<Utc>) -> Result<User> {
        self.calls.rotate_token.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let entry = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        entry.user.token = Some(token.to_string());
        entry.user.token_created_at = Some(at);
        Ok(entry.user.clone())
    }

    async fn clear_token(&self, id: UserId) -> Result<User> {
        self.calls.clear_token.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let entry = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        entry.user.token = None;
        entry.user.token_created_at = None;
        Ok(entry.user.clone())
    }

    async fn set_user_groups(&self, id: UserId, group_names: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&id) {
            return Err(DbError::NotFound);
        }
        let unknown: Vec<String> = group_names
            .iter()
            .filter(|name| !state.group_permissions.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(Self::unknown("group", unknown));
        }
        state.user_groups.insert(id, group_names.to_vec());
        Ok(())
    }

    async fn set_user_permissions(&self, id: UserId, permission_names: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&id) {
            return Err(DbError::NotFound);
        }
        let unknown: Vec<String> = permission_names
            .iter()
            .filter(|name| !state.permissions.contains(name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(Self::unknown("permission", unknown));
        }
        state.user_permissions.insert(id, permission_names.to_vec());
        Ok(())
    }

    async fn set_group_permissions(&self, id: GroupId, permission_names: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = state.groups.get(&id).cloned().ok_or(DbError::NotFound)?;
        let unknown: Vec<String> = permission_names
            .iter()
            .filter(|p| !state.permissions.contains(p.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(Self::unknown("permission", unknown));
        }
        state.group_permissions.insert(name, permission_names.to_vec());
        Ok(())
    }
}

/// A user whose token was issued and last used just now.
pub fn create_test_user(email: &str, is_superuser: bool) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        username: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        is_active: true,
        is_superuser,
        created_at: now,
        last_login: Some(now),
        token: Some(format!("tok-{}", Uuid::new_v4().simple())),
        token_created_at: Some(now),
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config
}

/// Authorization header for `user`'s current token.
pub fn auth_header(user: &User) -> (String, String) {
    (
        "authorization".to_string(),
        format!("Token {}", user.token.as_deref().unwrap_or_default()),
    )
}

/// Build the full router over `repo` and wrap it in a test server.
pub fn create_test_app(config: Config, repo: Arc<MockRepository>) -> TestServer {
    let state = crate::AppState::new(config, repo);
    let router = crate::build_router(state);
    TestServer::new(router).expect("Failed to create test server")
}
