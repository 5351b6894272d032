pub mod locks;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::batch::Batch;
use crate::models::campaign::Campaign;
use crate::models::courier::Courier;
use crate::models::item::Item;
use crate::models::notification::Notification;
use crate::models::order::Order;

/// In-process document store. Reads hand out clones; writes replace the
/// whole document. Callers serialize read-modify-write cycles through
/// [`locks::EntityLocks`].
#[derive(Default)]
pub struct Store {
    pub items: DashMap<Uuid, Item>,
    pub batches: DashMap<Uuid, Batch>,
    pub orders: DashMap<Uuid, Order>,
    pub couriers: DashMap<Uuid, Courier>,
    pub campaigns: DashMap<Uuid, Campaign>,
    pub notifications: DashMap<Uuid, Notification>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(&self, id: Uuid) -> Result<Item, AppError> {
        self.items
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("item {id} not found")))
    }

    pub fn batch(&self, id: Uuid) -> Result<Batch, AppError> {
        self.batches
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("batch {id} not found")))
    }

    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn courier(&self, id: Uuid) -> Result<Courier, AppError> {
        self.couriers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }

    pub fn campaign(&self, id: Uuid) -> Result<Campaign, AppError> {
        self.campaigns
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("campaign {id} not found")))
    }

    pub fn save_item(&self, item: Item) {
        self.items.insert(item.id, item);
    }

    pub fn save_batch(&self, batch: Batch) {
        self.batches.insert(batch.id, batch);
    }

    pub fn save_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn save_courier(&self, courier: Courier) {
        self.couriers.insert(courier.id, courier);
    }

    pub fn save_campaign(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, campaign);
    }

    pub fn save_notification(&self, notification: Notification) {
        self.notifications.insert(notification.id, notification);
    }

    /// Applies `apply` to every listed item that exists and returns how many
    /// were touched.
    pub fn update_items<F>(&self, ids: &[Uuid], mut apply: F) -> usize
    where
        F: FnMut(&mut Item),
    {
        let mut touched = 0;
        for id in ids {
            if let Some(mut item) = self.items.get_mut(id) {
                apply(item.value_mut());
                touched += 1;
            }
        }
        touched
    }

    pub fn update_courier<F>(&self, id: Uuid, apply: F) -> Result<Courier, AppError>
    where
        F: FnOnce(&mut Courier),
    {
        let mut courier = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;
        apply(courier.value_mut());
        Ok(courier.clone())
    }

    /// Items matching `predicate`, oldest first.
    pub fn find_items<P>(&self, predicate: P) -> Vec<Item>
    where
        P: Fn(&Item) -> bool,
    {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items
    }

    pub fn items_by_ids(&self, ids: &[Uuid]) -> Vec<Item> {
        ids.iter()
            .filter_map(|id| self.items.get(id).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Batches matching `predicate`, oldest first.
    pub fn find_batches<P>(&self, predicate: P) -> Vec<Batch>
    where
        P: Fn(&Batch) -> bool,
    {
        let mut batches: Vec<Batch> = self
            .batches
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        batches
    }

    pub fn delete_batches<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Batch) -> bool,
    {
        let before = self.batches.len();
        self.batches.retain(|_, batch| !predicate(batch));
        before.saturating_sub(self.batches.len())
    }

    /// Orders matching `predicate`, oldest first.
    pub fn find_orders<P>(&self, predicate: P) -> Vec<Order>
    where
        P: Fn(&Order) -> bool,
    {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    pub fn find_couriers<P>(&self, predicate: P) -> Vec<Courier>
    where
        P: Fn(&Courier) -> bool,
    {
        let mut couriers: Vec<Courier> = self
            .couriers
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        couriers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        couriers
    }

    /// Couriers in roster order; unknown ids are skipped.
    pub fn couriers_by_ids(&self, ids: &[Uuid]) -> Vec<Courier> {
        ids.iter()
            .filter_map(|id| self.couriers.get(id).map(|entry| entry.value().clone()))
            .collect()
    }

    /// A recipient's notifications, newest first.
    pub fn notifications_for(&self, recipient: Uuid) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.value().recipient == recipient)
            .map(|entry| entry.value().clone())
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        notifications
    }
}
