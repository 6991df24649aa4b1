use alloy_primitives::Address;

use crate::ledger::LedgerError;

/// Single owner recorded at deployment. Nothing changes it afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessControl {
    owner: Address,
}

impl AccessControl {
    pub fn new(owner: Address) -> Result<Self, LedgerError> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidAddress { role: "owner" });
        }
        Ok(Self { owner })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }
}
