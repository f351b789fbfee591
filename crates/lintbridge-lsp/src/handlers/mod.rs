//! LSP request handlers.
//!
//! This module wires handler submodules together.

mod analysis;
mod commands;
mod workspace;

use tower_lsp::jsonrpc::{self, ErrorCode};

use crate::backend::BackendError;

pub use analysis::{did_close, did_open, did_save};
pub use commands::{execute_command, COMMANDS};
pub use workspace::{did_change_configuration, did_change_workspace_folders, initialize_workspace};

/// Maps backend failures onto JSON-RPC errors. Unsupported capabilities
/// surface as `MethodNotFound` so clients can tell them apart from failures.
pub(crate) fn to_rpc_error(err: &BackendError) -> jsonrpc::Error {
    let code = match err {
        _ if err.is_unsupported() => ErrorCode::MethodNotFound,
        BackendError::UnknownScope(_) | BackendError::ScopeNotBound(_) => ErrorCode::InvalidParams,
        BackendError::Client(_) | BackendError::Engine(_) => ErrorCode::InternalError,
    };
    jsonrpc::Error {
        code,
        message: err.to_string().into(),
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lintbridge_core::EngineError;

    #[test]
    fn unsupported_maps_to_method_not_found() {
        let err = BackendError::from(EngineError::unsupported("assistBinding"));
        let rpc = to_rpc_error(&err);
        assert_eq!(rpc.code, ErrorCode::MethodNotFound);
        assert_eq!(rpc.message, "unsupported operation: assistBinding");

        let rpc = to_rpc_error(&BackendError::ScopeNotBound("file:///w".to_string()));
        assert_eq!(rpc.code, ErrorCode::InvalidParams);
        let rpc = to_rpc_error(&BackendError::Engine(EngineError::AlreadyShuttingDown));
        assert_eq!(rpc.code, ErrorCode::InternalError);
    }
}
