use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::{ReexecRequest, ReexecStatus};

#[async_trait]
pub trait ReexecRepository: Send + Sync {
	async fn create(&self, request: ReexecRequest) -> ReexecRequest;
	async fn get(&self, request_id: &str) -> Result<ReexecRequest, StoreError>;
	/// Transitions a pending request to `approved`, rejecting if it has
	/// already been decided.
	async fn mark_approved(&self, request_id: &str) -> Result<ReexecRequest, StoreError>;
}

#[derive(Default)]
pub struct InMemoryReexecRepository {
	requests: RwLock<HashMap<String, ReexecRequest>>,
}

impl InMemoryReexecRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl ReexecRepository for InMemoryReexecRepository {
	async fn create(&self, request: ReexecRequest) -> ReexecRequest {
		self.requests.write().insert(request.request_id.clone(), request.clone());
		request
	}

	async fn get(&self, request_id: &str) -> Result<ReexecRequest, StoreError> {
		self
			.requests
			.read()
			.get(request_id)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("Re-execution request '{request_id}' not found")))
	}

	async fn mark_approved(&self, request_id: &str) -> Result<ReexecRequest, StoreError> {
		let mut requests = self.requests.write();
		let request = requests
			.get_mut(request_id)
			.ok_or_else(|| StoreError::NotFound(format!("Re-execution request '{request_id}' not found")))?;
		if request.status != ReexecStatus::Pending {
			return Err(StoreError::Conflict(format!(
				"Re-execution request '{request_id}' already decided"
			)));
		}
		request.status = ReexecStatus::Approved;
		Ok(request.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(id: &str) -> ReexecRequest {
		ReexecRequest {
			request_id: id.to_string(),
			workflow_id: "wf-1".to_string(),
			requester: "alice".to_string(),
			requester_email: None,
			note: None,
			status: ReexecStatus::Pending,
			created_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn cannot_approve_twice() {
		let repo = InMemoryReexecRepository::new();
		repo.create(request("r1")).await;
		repo.mark_approved("r1").await.unwrap();
		assert!(matches!(repo.mark_approved("r1").await, Err(StoreError::Conflict(_))));
	}
}
