pub mod client;
pub mod payload;
pub mod retry;
pub mod task;

pub use client::{AmplitudeClient, BatchSender, ClientError, DeliveryFailure};
pub use payload::UploadPayload;
pub use retry::{IsRetryable, RetriesExhausted, RetryPolicy};
pub use task::{TaskOutcome, UploadTask};
