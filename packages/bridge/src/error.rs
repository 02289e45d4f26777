//! Error types for the B52 bridge core
//!
//! Every failure of a deposit transition is one of these variants. Each variant
//! carries a stable numeric code in the bridge codespace so that callers (CLI,
//! HTTP API, relayer) can tell permanent rejections from retryable ones.

use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum BridgeError {
    #[error("{0}")]
    Std(#[from] StdError),

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    #[error("Unauthorized: only the bridge authority can perform this action")]
    Unauthorized,

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    // ========================================================================
    // Source Chain Errors
    // ========================================================================

    #[error("Source chain unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid response from source chain: {reason}")]
    InvalidResponse { reason: String },

    // ========================================================================
    // Decode Errors
    // ========================================================================

    #[error("Malformed event data: {reason}")]
    MalformedEventData { reason: String },

    #[error("Malformed calldata: {reason}")]
    MalformedCalldata { reason: String },

    // ========================================================================
    // Deposit Errors
    // ========================================================================

    #[error("Invalid deposit: {reason}")]
    InvalidDeposit { reason: String },

    #[error("Deposit already processed: {identifier}")]
    AlreadyProcessed { identifier: String },

    #[error("Mint failure: {reason}")]
    MintFailure { reason: String },
}

/// Codespace shared by all bridge errors
pub const CODESPACE: &str = "bridge";

/// Whether an error reported as `code` is transient: the source chain was unreachable
/// or has not caught up yet. Every other rejection is final for that request.
pub fn is_retryable_code(code: u32) -> bool {
    matches!(code, 1107 | 1108)
}

impl BridgeError {
    /// Stable numeric code of this error within [`CODESPACE`].
    pub fn code(&self) -> u32 {
        match self {
            BridgeError::Std(_) => 1,
            BridgeError::Unauthorized => 1100,
            BridgeError::AlreadyProcessed { .. } => 1101,
            BridgeError::InvalidDeposit { .. } => 1102,
            BridgeError::InvalidRequest { .. } => 1104,
            BridgeError::SourceUnavailable { .. } => 1107,
            BridgeError::NotFound { .. } => 1108,
            BridgeError::InvalidResponse { .. } => 1109,
            BridgeError::MalformedEventData { .. } => 1110,
            BridgeError::MalformedCalldata { .. } => 1111,
            BridgeError::MintFailure { .. } => 1112,
        }
    }

    /// Short snake_case name of the variant, for metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Std(_) => "std",
            BridgeError::Unauthorized => "unauthorized",
            BridgeError::AlreadyProcessed { .. } => "already_processed",
            BridgeError::InvalidDeposit { .. } => "invalid_deposit",
            BridgeError::InvalidRequest { .. } => "invalid_request",
            BridgeError::SourceUnavailable { .. } => "source_unavailable",
            BridgeError::NotFound { .. } => "not_found",
            BridgeError::InvalidResponse { .. } => "invalid_response",
            BridgeError::MalformedEventData { .. } => "malformed_event_data",
            BridgeError::MalformedCalldata { .. } => "malformed_calldata",
            BridgeError::MintFailure { .. } => "mint_failure",
        }
    }

    /// Whether resubmitting the same request as a fresh transition may succeed.
    pub fn is_retryable(&self) -> bool {
        is_retryable_code(self.code())
    }

    pub(crate) fn source_unavailable(reason: impl ToString) -> Self {
        BridgeError::SourceUnavailable {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_deposit(reason: impl ToString) -> Self {
        BridgeError::InvalidDeposit {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let errors = vec![
            BridgeError::Std(StdError::generic_err("x")),
            BridgeError::Unauthorized,
            BridgeError::InvalidRequest { reason: "x".into() },
            BridgeError::SourceUnavailable { reason: "x".into() },
            BridgeError::NotFound { what: "x".into() },
            BridgeError::InvalidResponse { reason: "x".into() },
            BridgeError::MalformedEventData { reason: "x".into() },
            BridgeError::MalformedCalldata { reason: "x".into() },
            BridgeError::InvalidDeposit { reason: "x".into() },
            BridgeError::AlreadyProcessed {
                identifier: "x".into(),
            },
            BridgeError::MintFailure { reason: "x".into() },
        ];
        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());

        let retryable: Vec<u32> = errors
            .iter()
            .filter(|e| e.is_retryable())
            .map(|e| e.code())
            .collect();
        assert_eq!(retryable, vec![1107, 1108]);
    }

    #[test]
    fn test_only_source_errors_are_retryable() {
        assert!(BridgeError::source_unavailable("timeout").is_retryable());
        assert!(BridgeError::NotFound { what: "log".into() }.is_retryable());
        assert!(!BridgeError::AlreadyProcessed {
            identifier: "0xabc".into()
        }
        .is_retryable());
        assert!(!BridgeError::invalid_deposit("zero amount").is_retryable());
    }
}
