//! In-memory registry of active subscriptions and completed deals

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::common::types::{CompletedDeal, Subscription, SubscriptionKey, SubscriptionStatus};

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<String, Subscription>,
    completed: Vec<CompletedDeal>,
}

/// Shared subscription registry
///
/// Only the coordinator inserts, removes or replaces entries. Other
/// components receive clones of this handle and may read it, plus update
/// the derived `countdown` field through [`SubscriptionRegistry::set_countdown`].
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Subscription> {
        self.inner.read().await.active.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.active.contains_key(id)
    }

    /// Snapshot of every registry entry, soonest funding first
    pub async fn active(&self) -> Vec<Subscription> {
        let state = self.inner.read().await;
        let mut subs: Vec<Subscription> = state.active.values().cloned().collect();
        subs.sort_by(|a, b| {
            a.next_funding_time
                .cmp(&b.next_funding_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        subs
    }

    pub async fn completed(&self) -> Vec<CompletedDeal> {
        self.inner.read().await.completed.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.active.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.active.is_empty()
    }

    /// ACTIVE entry holding the (symbol, primary, hedge) slot, other than `except`
    ///
    /// Cancelled and errored records kept for display never hold the slot.
    pub async fn find_by_key(&self, key: &SubscriptionKey, except: Option<&str>) -> Option<Subscription> {
        self.inner
            .read()
            .await
            .active
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter(|s| except != Some(s.id.as_str()))
            .find(|s| &s.key() == key)
            .cloned()
    }

    /// Write the derived countdown; returns false when the entry is gone
    pub async fn set_countdown(&self, id: &str, seconds: i64) -> bool {
        match self.inner.write().await.active.get_mut(id) {
            Some(sub) => {
                sub.countdown = Some(seconds);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn insert(&self, subscription: Subscription) {
        self.inner
            .write()
            .await
            .active
            .insert(subscription.id.clone(), subscription);
    }

    pub(crate) async fn remove(&self, id: &str) -> Option<Subscription> {
        self.inner.write().await.active.remove(id)
    }

    /// Swap in a reconciled view; countdowns of surviving ids are kept
    pub(crate) async fn replace(&self, active: Vec<Subscription>, completed: Vec<CompletedDeal>) {
        let mut state = self.inner.write().await;
        let previous = std::mem::take(&mut state.active);
        state.active = active
            .into_iter()
            .map(|mut sub| {
                if sub.countdown.is_none() {
                    sub.countdown = previous.get(&sub.id).and_then(|p| p.countdown);
                }
                (sub.id.clone(), sub)
            })
            .collect();
        state.completed = completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Exchange, PositionType};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn subscription(id: &str, symbol: &str, offset_secs: i64) -> Subscription {
        Subscription {
            id: id.to_string(),
            symbol: symbol.to_string(),
            position_type: PositionType::Long,
            quantity: dec!(1),
            leverage: 2,
            margin: Some(dec!(10)),
            primary_credential_id: "p".to_string(),
            primary_exchange: Some(Exchange::Bybit),
            hedge_exchange: Exchange::Bingx,
            hedge_credential_id: "h".to_string(),
            funding_rate: dec!(0.0001),
            next_funding_time: Utc::now() + Duration::seconds(offset_secs),
            status: SubscriptionStatus::Active,
            execution_delay: None,
            countdown: None,
        }
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SubscriptionRegistry::new();
        registry.insert(subscription("a", "BTCUSDT", 60)).await;
        assert!(registry.contains("a").await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove("a").await.is_some());
        assert!(registry.is_empty().await);
        assert!(registry.remove("a").await.is_none());
    }

    #[tokio::test]
    async fn test_active_sorted_by_funding_time() {
        let registry = SubscriptionRegistry::new();
        registry.insert(subscription("late", "ETHUSDT", 600)).await;
        registry.insert(subscription("soon", "BTCUSDT", 30)).await;
        let ids: Vec<String> = registry.active().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["soon", "late"]);
    }

    #[tokio::test]
    async fn test_countdown_only_for_present_entries() {
        let registry = SubscriptionRegistry::new();
        registry.insert(subscription("a", "BTCUSDT", 60)).await;
        assert!(registry.set_countdown("a", 42).await);
        assert!(!registry.set_countdown("missing", 42).await);
        assert_eq!(registry.get("a").await.unwrap().countdown, Some(42));
    }

    #[tokio::test]
    async fn test_replace_keeps_countdown_of_survivors() {
        let registry = SubscriptionRegistry::new();
        registry.insert(subscription("a", "BTCUSDT", 60)).await;
        registry.insert(subscription("b", "ETHUSDT", 60)).await;
        registry.set_countdown("a", 12).await;

        registry
            .replace(vec![subscription("a", "BTCUSDT", 60), subscription("c", "SOLUSDT", 90)], vec![])
            .await;

        assert!(!registry.contains("b").await);
        assert_eq!(registry.get("a").await.unwrap().countdown, Some(12));
        assert_eq!(registry.get("c").await.unwrap().countdown, None);
    }

    #[tokio::test]
    async fn test_find_by_key() {
        let registry = SubscriptionRegistry::new();
        let sub = subscription("a", "BTCUSDT", 60);
        let key = sub.key();
        registry.insert(sub).await;
        assert_eq!(registry.find_by_key(&key, None).await.map(|s| s.id), Some("a".to_string()));
        assert!(registry.find_by_key(&key, Some("a")).await.is_none());
    }

    #[tokio::test]
    async fn test_find_by_key_skips_inactive_entries() {
        let registry = SubscriptionRegistry::new();
        let mut cancelled = subscription("old", "BTCUSDT", 60);
        cancelled.status = SubscriptionStatus::Cancelled;
        let mut errored = subscription("failed", "BTCUSDT", 60);
        errored.status = SubscriptionStatus::Error;
        let key = cancelled.key();
        registry.insert(cancelled).await;
        registry.insert(errored).await;

        assert!(registry.find_by_key(&key, None).await.is_none());
    }
}
