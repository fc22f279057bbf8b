use std::marker::PhantomData;

use tracing::debug;

use crate::api::{ApiClient, ApiRequest, RawFailure, RemoteOutcome, Transport};
use crate::models::Resource;

/// List/get/create/update/delete for one record kind.
pub struct RecordService<T, R> {
    client: ApiClient<T>,
    _resource: PhantomData<fn() -> R>,
}

impl<T, R> Clone for RecordService<T, R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _resource: PhantomData,
        }
    }
}

impl<T: Transport, R: Resource> RecordService<T, R> {
    pub fn new(client: ApiClient<T>) -> Self {
        Self {
            client,
            _resource: PhantomData,
        }
    }

    pub async fn list(&self) -> RemoteOutcome<Vec<R>> {
        debug!(resource = R::NAME, "Listing records");
        self.client.execute(ApiRequest::get(R::PATH)).await
    }

    pub async fn get(&self, id: &str) -> RemoteOutcome<R> {
        self.client.execute(ApiRequest::get(R::item_path(id))).await
    }

    pub async fn create(&self, record: &R) -> RemoteOutcome<R> {
        self.send_body(ApiRequest::post(R::PATH), record).await
    }

    pub async fn update(&self, id: &str, record: &R) -> RemoteOutcome<R> {
        self.send_body(ApiRequest::put(R::item_path(id)), record).await
    }

    pub async fn delete(&self, id: &str) -> RemoteOutcome<()> {
        debug!(resource = R::NAME, id = id, "Deleting record");
        self.client.execute(ApiRequest::delete(R::item_path(id))).await
    }

    async fn send_body(&self, request: ApiRequest, record: &R) -> RemoteOutcome<R> {
        match request.json(record) {
            Ok(request) => self.client.execute(request).await,
            Err(e) => RemoteOutcome::failure(&RawFailure::Other(e.to_string())),
        }
    }
}
