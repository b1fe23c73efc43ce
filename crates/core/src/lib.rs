pub mod clock;
pub mod config;
pub mod detector;
pub mod domain;
pub mod errors;
pub mod export;
pub mod healing;
pub mod learning;
pub mod monitor;
pub mod outbound;
pub mod scenarios;
pub mod signals;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use detector::{DetectionContext, DetectionResult, DetectorConfig, ErrorDetector};
pub use domain::error::{DetectedError, ErrorType, Severity};
pub use domain::healing::{Directive, HealingAction, HealingActionType, HealingResult};
pub use domain::learning::{LearningDataPoint, MiningSample};
pub use domain::turn::{ConversationId, ConversationStage, SessionId, Turn, TurnId, TurnInput};
pub use errors::{ApplicationError, DomainError, InterfaceError, SignalError};
pub use export::{export_batch, export_dataset, ExportError, ExportFormat};
pub use healing::{HealingOrchestrator, HealingPolicy};
pub use learning::{
    spawn_schedule, ExperimentRegistry, LearningMiner, MiningOutcome, MiningSchedule, MiningSource,
};
pub use monitor::{IngestOutcome, MonitorServices, QualityMonitor};
pub use outbound::{CriticalAlert, InMemoryOutboundSink, NoopOutboundSink, OutboundSink};
pub use scenarios::{BatchRequest, BatchTestReport, ScenarioGenerator, TrainingBatch};
pub use signals::{Intent, SignalSuite};
pub use telemetry::{BusMetrics, TelemetryBus, TurnRecord};
