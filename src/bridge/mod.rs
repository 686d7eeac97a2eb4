mod coerce;
mod correlation;
mod payload;
mod protocol;

pub use coerce::coerce_dialog_value;
pub use correlation::CorrelationTable;
pub use payload::{validate_payload, PayloadKind};
pub use protocol::{
    Ack, BridgeMethod, CallRequest, CallResult, CorrelationId, DialogRequest, DialogResult,
    DialogType, ExecutionStatus, PageEnvelope, RuntimeEnvelope, RuntimeMessage, TabEnvelope,
    TabId, TabMessage, WindowEnvelope,
};
