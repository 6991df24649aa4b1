//! The deployed Crypto Perx token: owner record plus ledger, behind the
//! caller-oriented operation surface.

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::access::AccessControl;
use crate::calls::{CallReceipt, TokenCall};
use crate::ledger::{Ledger, LedgerError};

pub const NAME: &str = "Crypto Perx";
pub const SYMBOL: &str = "CPRX";
pub const DECIMALS: u8 = 18;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    access: AccessControl,
    ledger: Ledger,
}

impl Token {
    /// Validates `owner` first, then `wallet`, and mints the full supply to
    /// `wallet`.
    pub fn deploy(owner: Address, wallet: Address) -> Result<Self, LedgerError> {
        let access = AccessControl::new(owner)?;
        let ledger = Ledger::genesis(wallet)?;
        info!(%owner, %wallet, supply = %ledger.total_supply(), "token deployed");
        Ok(Self { access, ledger })
    }

    pub fn from_parts(access: AccessControl, ledger: Ledger) -> Self {
        Self { access, ledger }
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn symbol(&self) -> &'static str {
        SYMBOL
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn total_supply(&self) -> U256 {
        self.ledger.total_supply()
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.ledger.balance_of(holder)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.ledger.allowance(owner, spender)
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<bool, LedgerError> {
        self.ledger.transfer(caller, to, amount)?;
        Ok(true)
    }

    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: U256,
    ) -> Result<bool, LedgerError> {
        self.ledger.approve(caller, spender, amount)?;
        Ok(true)
    }

    pub fn transfer_from(
        &mut self,
        caller: Address,
        owner: Address,
        to: Address,
        amount: U256,
    ) -> Result<bool, LedgerError> {
        self.ledger.transfer_from(caller, owner, to, amount)?;
        Ok(true)
    }

    pub fn increase_allowance(
        &mut self,
        caller: Address,
        spender: Address,
        added: U256,
    ) -> Result<bool, LedgerError> {
        self.ledger.increase_allowance(caller, spender, added)?;
        Ok(true)
    }

    pub fn decrease_allowance(
        &mut self,
        caller: Address,
        spender: Address,
        subtracted: U256,
    ) -> Result<bool, LedgerError> {
        self.ledger.decrease_allowance(caller, spender, subtracted)?;
        Ok(true)
    }

    pub fn burn(&mut self, caller: Address, amount: U256) -> Result<bool, LedgerError> {
        self.ledger.burn(caller, amount)?;
        Ok(true)
    }

    pub fn burn_from(
        &mut self,
        caller: Address,
        holder: Address,
        amount: U256,
    ) -> Result<bool, LedgerError> {
        self.ledger.burn_from(caller, holder, amount)?;
        Ok(true)
    }

    /// Dispatches `call` for `caller` and returns the events it logged.
    pub fn execute(
        &mut self,
        caller: Address,
        call: &TokenCall,
    ) -> Result<CallReceipt, LedgerError> {
        let logged = self.ledger.events().len();
        match call {
            TokenCall::Transfer { to, amount } => self.transfer(caller, *to, *amount)?,
            TokenCall::Approve { spender, amount } => self.approve(caller, *spender, *amount)?,
            TokenCall::TransferFrom { owner, to, amount } => {
                self.transfer_from(caller, *owner, *to, *amount)?
            }
            TokenCall::IncreaseAllowance { spender, added } => {
                self.increase_allowance(caller, *spender, *added)?
            }
            TokenCall::DecreaseAllowance {
                spender,
                subtracted,
            } => self.decrease_allowance(caller, *spender, *subtracted)?,
            TokenCall::Burn { amount } => self.burn(caller, *amount)?,
            TokenCall::BurnFrom { holder, amount } => self.burn_from(caller, *holder, *amount)?,
        };
        Ok(CallReceipt {
            caller,
            call: call.clone(),
            events: self.ledger.events()[logged..].to_vec(),
        })
    }
}
