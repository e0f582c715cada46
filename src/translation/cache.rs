use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source text to translated text, shared by every item of one run.
///
/// Input sets repeat short fields (empty contexts, boilerplate instructions)
/// often enough that remembering them saves rate-limited calls.
#[derive(Debug, Clone)]
pub struct TranslationMemo {
    entries: Arc<RwLock<HashMap<String, String>>>,
    max_size: usize,
}

impl TranslationMemo {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_size,
        }
    }

    pub async fn get(&self, source: &str) -> Option<String> {
        self.entries.read().await.get(source).cloned()
    }

    pub async fn insert(&self, source: String, translated: String) {
        if self.max_size == 0 {
            return;
        }
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_size && !entries.contains_key(&source) {
            if let Some(key) = entries.keys().next().cloned() {
                entries.remove(&key);
            }
        }

        entries.insert(source, translated);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for TranslationMemo {
    fn default() -> Self {
        Self::new(10000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remembers_translations() {
        let memo = TranslationMemo::new(4);
        memo.insert("Hello".into(), "Mhoro".into()).await;
        assert_eq!(memo.get("Hello").await.as_deref(), Some("Mhoro"));
        assert_eq!(memo.get("Goodbye").await, None);
    }

    #[tokio::test]
    async fn evicts_when_full() {
        let memo = TranslationMemo::new(2);
        memo.insert("a".into(), "1".into()).await;
        memo.insert("b".into(), "2".into()).await;
        memo.insert("c".into(), "3".into()).await;
        assert_eq!(memo.len().await, 2);
        assert_eq!(memo.get("c").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn zero_capacity_disables_memo() {
        let memo = TranslationMemo::new(0);
        memo.insert("a".into(), "1".into()).await;
        assert!(memo.is_empty().await);
    }
}
