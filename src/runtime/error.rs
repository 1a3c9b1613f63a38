use thiserror::Error;

/// 核心错误类型 (装载/编排阶段；运行期故障只降级并记录日志，不会返回错误)
#[derive(Debug, Error)]
pub enum RegieError {
    #[error("cutscene not found: {0}")]
    SheetNotFound(String),

    #[error("cutscene '{0}' has no nodes")]
    EmptySheet(String),

    #[error("duplicate node id '{node}' in cutscene '{sheet}'")]
    DuplicateNodeId { sheet: String, node: String },

    #[error("unknown transition target '{target}' referenced by node '{from_node}'")]
    UnknownTarget { from_node: String, target: String },

    #[error("unknown payload kind: {0}")]
    UnknownPayload(String),

    #[error("payload '{kind}' failed to prepare")]
    PayloadPrepare {
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid condition '{expr}': {message}")]
    BadCondition { expr: String, message: String },
}
