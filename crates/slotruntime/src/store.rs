use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use slotcore::{Result, Section, SectionError, SectionId, Topic, TopicId};
use tokio::sync::RwLock;

/// Persistence boundary for sections. The engine only ever reads and writes
/// whole rows through this trait, so a database-backed store can slot in
/// without touching the dispatcher.
#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Creates a section at the end of the topic's ordering.
    async fn create(&self, topic_id: TopicId, widget: &str, language: &str) -> Section;

    async fn get(&self, id: SectionId) -> Result<Section>;

    /// Whole-row replacement of an existing section.
    async fn update(&self, section: Section) -> Result<()>;

    /// Oldest section on the topic bound to the given widget, if any.
    async fn find_by_topic_and_widget(&self, topic_id: TopicId, widget: &str) -> Option<Section>;

    async fn list_by_topic(&self, topic_id: TopicId) -> Vec<Section>;
}

#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn insert(&self, topic: Topic);

    async fn get(&self, id: TopicId) -> Result<Topic>;
}

/// HashMap-backed store used by the server, the CLI demo mode and tests.
pub struct InMemorySectionStore {
    sections: RwLock<HashMap<SectionId, Section>>,
    next_id: AtomicI64,
}

impl InMemorySectionStore {
    pub fn new() -> Self {
        Self {
            sections: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemorySectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SectionStore for InMemorySectionStore {
    async fn create(&self, topic_id: TopicId, widget: &str, language: &str) -> Section {
        let mut sections = self.sections.write().await;
        let position = sections
            .values()
            .filter(|s| s.topic_id == topic_id)
            .count() as i32;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let section = Section::new(id, topic_id, widget, language, position);
        sections.insert(id, section.clone());
        section
    }

    async fn get(&self, id: SectionId) -> Result<Section> {
        self.sections
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SectionError::NotFound(id).into())
    }

    async fn update(&self, section: Section) -> Result<()> {
        let mut sections = self.sections.write().await;
        if !sections.contains_key(&section.id) {
            return Err(SectionError::NotFound(section.id).into());
        }
        sections.insert(section.id, section);
        Ok(())
    }

    async fn find_by_topic_and_widget(&self, topic_id: TopicId, widget: &str) -> Option<Section> {
        self.sections
            .read()
            .await
            .values()
            .filter(|s| s.topic_id == topic_id && s.widget == widget)
            .min_by_key(|s| s.id)
            .cloned()
    }

    async fn list_by_topic(&self, topic_id: TopicId) -> Vec<Section> {
        let mut result: Vec<Section> = self
            .sections
            .read()
            .await
            .values()
            .filter(|s| s.topic_id == topic_id)
            .cloned()
            .collect();
        result.sort_by_key(|s| (s.position, s.id));
        result
    }
}

pub struct InMemoryTopicStore {
    topics: RwLock<HashMap<TopicId, Topic>>,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTopicStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicStore for InMemoryTopicStore {
    async fn insert(&self, topic: Topic) {
        self.topics.write().await.insert(topic.id, topic);
    }

    async fn get(&self, id: TopicId) -> Result<Topic> {
        self.topics
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SectionError::TopicNotFound(id).into())
    }
}
