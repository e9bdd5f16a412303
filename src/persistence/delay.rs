//! Simulated request latency
//!
//! `Delayed` yields to the executor a fixed number of times before forwarding
//! each call (request latency) and, optionally, before handing the result back
//! (response latency). Requests from several engines polled together
//! (`join!`, `join_all`) then interleave the way real round trips do, and a
//! change feed can deliver an echo before the response arrives.

use async_trait::async_trait;
use tokio::task::yield_now;

use super::{CreatePlacement, ListQuery, PersistenceService};
use crate::error::ServiceError;
use crate::records::{DeviceId, StickerId, StoredSticker};

async fn yield_times(turns: u32) {
    for _ in 0..turns {
        yield_now().await;
    }
}

#[derive(Debug, Clone)]
pub struct Delayed<P> {
    inner: P,
    request_yields: u32,
    response_yields: u32,
}

impl<P> Delayed<P> {
    /// Wrap `inner`; every request waits `yields` executor turns
    pub fn new(inner: P, yields: u32) -> Self {
        Self {
            inner,
            request_yields: yields,
            response_yields: 0,
        }
    }

    /// Also hold every result back for `yields` turns
    pub fn with_response_delay(mut self, yields: u32) -> Self {
        self.response_yields = yields;
        self
    }
}

#[async_trait(?Send)]
impl<P: PersistenceService> PersistenceService for Delayed<P> {
    async fn create_placement(
        &self,
        request: CreatePlacement,
    ) -> Result<StoredSticker, ServiceError> {
        yield_times(self.request_yields).await;
        let result = self.inner.create_placement(request).await;
        yield_times(self.response_yields).await;
        result
    }

    async fn update_note(
        &self,
        id: StickerId,
        note: &str,
        owner: Option<&DeviceId>,
    ) -> Result<StoredSticker, ServiceError> {
        yield_times(self.request_yields).await;
        let result = self.inner.update_note(id, note, owner).await;
        yield_times(self.response_yields).await;
        result
    }

    async fn delete_record(
        &self,
        id: StickerId,
        owner: Option<&DeviceId>,
    ) -> Result<(), ServiceError> {
        yield_times(self.request_yields).await;
        let result = self.inner.delete_record(id, owner).await;
        yield_times(self.response_yields).await;
        result
    }

    async fn list_records(&self, query: &ListQuery) -> Result<Vec<StoredSticker>, ServiceError> {
        yield_times(self.request_yields).await;
        let result = self.inner.list_records(query).await;
        yield_times(self.response_yields).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CanvasSize;
    use crate::persistence::{InMemoryPersistence, ServerRules};
    use futures::executor::block_on;
    use futures::join;
    use std::rc::Rc;

    fn request(x: f32) -> CreatePlacement {
        CreatePlacement {
            x_norm: x,
            y_norm: 0.5,
            note: "hi".into(),
            owner_device_id: None,
        }
    }

    #[test]
    fn test_slow_request_lands_after_fast_one() {
        let server = InMemoryPersistence::shared(ServerRules::new(
            CanvasSize::new(1000.0, 1000.0),
            36.0,
        ));
        let slow = Delayed::new(Rc::clone(&server), 5);
        let fast = Delayed::new(Rc::clone(&server), 0);

        // Both aim at the same spot; the one polled first but delayed loses
        let (slow_result, fast_result) = block_on(async {
            join!(
                slow.create_placement(request(0.1)),
                fast.create_placement(request(0.1))
            )
        });
        assert!(fast_result.is_ok());
        assert!(slow_result.unwrap_err().is_conflict());
    }
}
