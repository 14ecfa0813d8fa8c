//! 用户目录 - 请求者身份解析
//!
//! 秒杀服务不负责注册与登录；调用方带着用户 id 进来，这里只
//! 回答「这个 id 是谁」。查不到的 id 一律按未认证处理。

use dashmap::DashMap;
use shared::models::UserProfile;

/// Identity lookup for incoming requests.
pub trait UserDirectory: Send + Sync {
    fn resolve(&self, user_id: &str) -> Option<UserProfile>;
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserProfile>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    /// Demo accounts used by the load-drill binary and tests.
    pub fn seed_demo() -> Self {
        Self::with_users((1..=100).map(|n| UserProfile {
            id: format!("user_{n}"),
            email: format!("user{n}@example.com"),
        }))
    }

    pub fn insert(&self, user: UserProfile) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn resolve(&self, user_id: &str) -> Option<UserProfile> {
        self.users.get(user_id).map(|u| u.clone())
    }
}
