//! Submission of retrievals, one time window at a time.

use std::sync::Arc;

use era5_common::{BoundingBox, TimeWindow};
use tracing::{info, instrument};

use crate::client::ArchiveClient;
use crate::error::SubmitError;
use crate::request::RetrieveRequest;
use crate::task::RemoteTask;

/// Turns time windows into submitted [`RemoteTask`]s for one dataset.
pub struct TaskSubmitter<C: ?Sized> {
    client: Arc<C>,
    dataset: String,
}

impl<C> TaskSubmitter<C>
where
    C: ArchiveClient + ?Sized,
{
    pub fn new(client: Arc<C>, dataset: impl Into<String>) -> Self {
        Self {
            client,
            dataset: dataset.into(),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Submit every hour of every day in `window` for `variables` over `extent`.
    ///
    /// A 403 means the dataset licence has not been accepted; any other
    /// failure is reported as the archive being unavailable. Nothing is retried.
    #[instrument(skip_all, fields(window = %window, dataset = %self.dataset))]
    pub async fn submit(
        &self,
        window: &TimeWindow,
        variables: &[String],
        extent: &BoundingBox,
    ) -> Result<RemoteTask, SubmitError> {
        let request = RetrieveRequest::new(window, variables, extent);
        let job = self
            .client
            .submit(&self.dataset, &request)
            .await
            .map_err(|e| SubmitError::from_transport(&self.dataset, e))?;

        let task = RemoteTask {
            result_url: job.status_url,
            auth_headers: self.client.auth_headers(),
            identifier: window.identifier(),
        };
        info!(
            task = %task.identifier,
            job_id = %job.job_id,
            fields = request.field_count(),
            "Submitted task"
        );
        Ok(task)
    }
}
