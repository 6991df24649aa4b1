use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerEvent;

/// A mutating token operation, as submitted by a caller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenCall {
    Transfer {
        to: Address,
        amount: U256,
    },
    Approve {
        spender: Address,
        amount: U256,
    },
    TransferFrom {
        owner: Address,
        to: Address,
        amount: U256,
    },
    IncreaseAllowance {
        spender: Address,
        added: U256,
    },
    DecreaseAllowance {
        spender: Address,
        subtracted: U256,
    },
    Burn {
        amount: U256,
    },
    BurnFrom {
        holder: Address,
        amount: U256,
    },
}

impl TokenCall {
    pub fn name(&self) -> &'static str {
        match self {
            TokenCall::Transfer { .. } => "transfer",
            TokenCall::Approve { .. } => "approve",
            TokenCall::TransferFrom { .. } => "transfer_from",
            TokenCall::IncreaseAllowance { .. } => "increase_allowance",
            TokenCall::DecreaseAllowance { .. } => "decrease_allowance",
            TokenCall::Burn { .. } => "burn",
            TokenCall::BurnFrom { .. } => "burn_from",
        }
    }
}

/// Outcome of an accepted call: who made it and the log records it appended.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallReceipt {
    pub caller: Address,
    pub call: TokenCall,
    pub events: Vec<LedgerEvent>,
}
