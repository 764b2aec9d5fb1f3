#![forbid(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod session;
pub mod shutdown;
pub mod state;
pub mod supervisor;

pub use codec::{LineCodec, LineEvent};
pub use dispatch::{SessionEvent, UiModel};
pub use error::{WxError, WxResult};
pub use model::{TranscriptionResult, WorkerCommand};
pub use session::{SpawnSpec, WorkerSession};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome};
pub use state::UiState;
pub use supervisor::{Supervisor, SupervisorConfig};
