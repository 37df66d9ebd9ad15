use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::widget::slugify;

pub type TopicId = Uuid;
pub type AccountId = Uuid;

/// Parent entity that owns sections.
///
/// Topics live in a collaborator store; the engine reads them for ownership
/// checks and for the default context values handed to actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub owner_id: AccountId,
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(owner_id: AccountId, title: impl Into<String>) -> Self {
        let title = title.into();
        let slug = slugify(&title);
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title,
            slug,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, account: AccountId) -> bool {
        self.owner_id == account
    }
}
