//! Core configuration.

use crate::invite::DEFAULT_INVITE_CODE_LEN;

/// Configuration shared by the service layer.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How many times a multi-document transaction is retried after a
    /// transient store error (write conflict, dropped connection) before the
    /// failure is surfaced to the caller.
    pub max_transaction_retries: u32,

    /// Length of generated organization invite codes.
    pub invite_code_length: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_retries: 3,
            invite_code_length: DEFAULT_INVITE_CODE_LEN,
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_transaction_retries(mut self, retries: u32) -> Self {
        self.max_transaction_retries = retries;
        self
    }

    pub fn invite_code_length(mut self, length: usize) -> Self {
        self.invite_code_length = length;
        self
    }
}
