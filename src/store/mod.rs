use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::AccessControl;
use crate::ledger::{Ledger, LedgerError, LedgerSnapshot};
use crate::token::Token;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("call {0} was already applied")]
    DuplicateCall(B256),
}

/// On-disk form of a deployed token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateFile {
    pub owner: Address,
    pub ledger: LedgerSnapshot,
    /// Digests of signed calls already executed.
    #[serde(default)]
    pub applied_calls: BTreeSet<B256>,
}

impl StateFile {
    pub fn from_token(token: &Token) -> Self {
        Self {
            owner: token.owner(),
            ledger: token.ledger().snapshot(),
            applied_calls: BTreeSet::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), root = %self.ledger.state_root, "state saved");
        Ok(())
    }

    /// Restores the token, verifying the owner, state root and supply.
    pub fn to_token(&self) -> Result<Token, StoreError> {
        let access = AccessControl::new(self.owner)?;
        let ledger = Ledger::restore(&self.ledger)?;
        Ok(Token::from_parts(access, ledger))
    }

    pub fn update(&mut self, token: &Token) {
        self.owner = token.owner();
        self.ledger = token.ledger().snapshot();
    }

    pub fn ensure_fresh(&self, digest: B256) -> Result<(), StoreError> {
        if self.applied_calls.contains(&digest) {
            return Err(StoreError::DuplicateCall(digest));
        }
        Ok(())
    }

    pub fn record_call(&mut self, digest: B256) -> Result<(), StoreError> {
        self.ensure_fresh(digest)?;
        self.applied_calls.insert(digest);
        Ok(())
    }
}
