pub mod publisher;
pub mod relay;
pub mod types;

pub use publisher::{KafkaConfig, KafkaPublisher, Publisher};
pub use relay::{DrainSummary, OutboxRelay, RelayConfig};
pub use types::{AccountOpened, MovementCompleted};
