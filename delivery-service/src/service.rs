use std::sync::Arc;

use rand::seq::SliceRandom;
use shared::{CheckoutError, Courier, CourierAssignment, Delivery, DeliveryStatus, Result};
use tracing::{debug, info};

use crate::repo::DeliveryRepo;

/// Picks the courier for a new delivery among the idle ones.
pub trait CourierSelector: Send + Sync {
    fn select<'a>(&self, candidates: &'a [Courier]) -> Option<&'a Courier>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl CourierSelector for RandomSelector {
    fn select<'a>(&self, candidates: &'a [Courier]) -> Option<&'a Courier> {
        candidates.choose(&mut rand::thread_rng())
    }
}

/// Always the idle courier with the lowest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstIdleSelector;

impl CourierSelector for FirstIdleSelector {
    fn select<'a>(&self, candidates: &'a [Courier]) -> Option<&'a Courier> {
        candidates.iter().min_by_key(|c| c.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SelectionStrategy {
    Random,
    FirstIdle,
}

impl SelectionStrategy {
    pub fn selector(self) -> Arc<dyn CourierSelector> {
        match self {
            SelectionStrategy::Random => Arc::new(RandomSelector),
            SelectionStrategy::FirstIdle => Arc::new(FirstIdleSelector),
        }
    }
}

pub struct DeliveryService {
    repo: Arc<dyn DeliveryRepo>,
    selector: Arc<dyn CourierSelector>,
}

impl DeliveryService {
    pub fn new(repo: Arc<dyn DeliveryRepo>, selector: Arc<dyn CourierSelector>) -> Self {
        Self { repo, selector }
    }

    pub async fn add_courier(&self, name: &str, is_on_shift: bool) -> Result<Courier> {
        if name.trim().is_empty() {
            return Err(CheckoutError::Validation("courier name must not be empty".to_string()));
        }
        self.repo.add_courier(name, is_on_shift).await
    }

    /// Assigns an idle courier to the order. An order that already has a
    /// delivery keeps it.
    pub async fn assign_courier(&self, order_id: i64) -> Result<CourierAssignment> {
        if let Some(existing) = self.repo.delivery_for_order(order_id).await? {
            debug!(order_id, delivery_id = existing.id, "order already has a courier");
            return Ok(assignment(&existing));
        }

        let idle = self.repo.idle_couriers().await?;
        let courier = self
            .selector
            .select(&idle)
            .ok_or(CheckoutError::NoCourierAvailable)?;

        let delivery = match self.repo.add_delivery(order_id, courier.id).await {
            Ok(delivery) => delivery,
            Err(CheckoutError::AlreadyExists(_)) => self
                .repo
                .delivery_for_order(order_id)
                .await?
                .ok_or_else(|| CheckoutError::NotFound(format!("delivery for order {order_id}")))?,
            Err(e) => return Err(e),
        };

        info!(order_id, courier_id = delivery.courier_id, delivery_id = delivery.id, "courier assigned");
        Ok(assignment(&delivery))
    }

    pub async fn deliveries(&self) -> Result<Vec<Delivery>> {
        self.repo.deliveries().await
    }

    pub async fn delivery(&self, id: i64) -> Result<Delivery> {
        self.repo.delivery(id).await
    }

    /// Marks the delivery as delivered, which frees its courier.
    pub async fn complete(&self, id: i64) -> Result<Delivery> {
        let delivery = self.repo.delivery(id).await?;
        if delivery.status == DeliveryStatus::Delivered {
            return Ok(delivery);
        }
        let delivery = self.repo.set_status(id, DeliveryStatus::Delivered).await?;
        info!(delivery_id = id, courier_id = delivery.courier_id, "delivery completed");
        Ok(delivery)
    }

    /// Takes back a delivery that has not been completed, freeing its
    /// courier. Returns `false` when there was nothing to release.
    pub async fn release(&self, id: i64) -> Result<bool> {
        if self.repo.remove_on_the_way(id).await? {
            info!(delivery_id = id, "delivery released");
            return Ok(true);
        }
        match self.repo.delivery(id).await {
            Ok(delivery) => Err(CheckoutError::Validation(format!(
                "delivery {} is already {}",
                delivery.id,
                delivery.status.as_str()
            ))),
            Err(CheckoutError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn assignment(delivery: &Delivery) -> CourierAssignment {
    CourierAssignment {
        courier_id: delivery.courier_id,
        delivery_id: delivery.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::InMemoryDeliveryRepo;

    async fn service(couriers: &[(&str, bool)]) -> DeliveryService {
        let repo = Arc::new(InMemoryDeliveryRepo::default());
        for (name, on_shift) in couriers {
            repo.add_courier(name, *on_shift).await.unwrap();
        }
        DeliveryService::new(repo, Arc::new(FirstIdleSelector))
    }

    fn courier(id: i64) -> Courier {
        Courier {
            id,
            name: format!("courier-{id}"),
            is_on_shift: true,
        }
    }

    #[test]
    fn first_idle_picks_the_lowest_id() {
        let candidates = vec![courier(3), courier(1), courier(2)];
        assert_eq!(FirstIdleSelector.select(&candidates).map(|c| c.id), Some(1));
        assert!(FirstIdleSelector.select(&[]).is_none());
    }

    #[test]
    fn random_picks_one_of_the_candidates() {
        let candidates = vec![courier(4), courier(5)];
        let picked = RandomSelector.select(&candidates).unwrap();
        assert!([4, 5].contains(&picked.id));
    }

    #[tokio::test]
    async fn busy_and_off_shift_couriers_are_skipped() {
        let service = service(&[("ann", true), ("bob", false), ("cid", true)]).await;

        let first = service.assign_courier(10).await.unwrap();
        let second = service.assign_courier(11).await.unwrap();

        assert_eq!(first.courier_id, 1);
        assert_eq!(second.courier_id, 3);
        assert!(matches!(
            service.assign_courier(12).await,
            Err(CheckoutError::NoCourierAvailable)
        ));
    }

    #[tokio::test]
    async fn repeated_assignment_returns_the_same_delivery() {
        let service = service(&[("ann", true), ("bob", true)]).await;

        let first = service.assign_courier(10).await.unwrap();
        let again = service.assign_courier(10).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(service.deliveries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completing_a_delivery_frees_the_courier() {
        let service = service(&[("ann", true)]).await;

        let assigned = service.assign_courier(10).await.unwrap();
        let done = service.complete(assigned.delivery_id).await.unwrap();
        assert_eq!(done.status, DeliveryStatus::Delivered);
        assert_eq!(
            service.complete(assigned.delivery_id).await.unwrap().status,
            DeliveryStatus::Delivered
        );

        let next = service.assign_courier(11).await.unwrap();
        assert_eq!(next.courier_id, assigned.courier_id);
    }

    #[tokio::test]
    async fn released_delivery_frees_the_courier() {
        let service = service(&[("ann", true)]).await;

        let assigned = service.assign_courier(10).await.unwrap();
        assert!(service.release(assigned.delivery_id).await.unwrap());
        assert!(!service.release(assigned.delivery_id).await.unwrap());
        assert!(service.deliveries().await.unwrap().is_empty());

        let next = service.assign_courier(11).await.unwrap();
        assert_eq!(next.courier_id, assigned.courier_id);
    }

    #[tokio::test]
    async fn delivered_delivery_cannot_be_released() {
        let service = service(&[("ann", true)]).await;

        let assigned = service.assign_courier(10).await.unwrap();
        service.complete(assigned.delivery_id).await.unwrap();

        assert!(matches!(
            service.release(assigned.delivery_id).await,
            Err(CheckoutError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_delivery_is_not_found() {
        let service = service(&[]).await;
        assert!(matches!(
            service.complete(7).await,
            Err(CheckoutError::NotFound(_))
        ));
    }
}
