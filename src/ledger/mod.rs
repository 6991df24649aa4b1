use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// 3_000_000_000 CPRX with 18 decimals (3e27 base units).
pub const INITIAL_SUPPLY: U256 = U256::from_limbs([0xdf71_80b6_b800_0000, 0x09b1_8ab5, 0, 0]);

/// Which kind of debit a balance or allowance check guarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Debit {
    Transfer,
    Burn,
}

impl fmt::Display for Debit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Debit::Transfer => f.write_str("transfer"),
            Debit::Burn => f.write_str("burn"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("CPRX: incorrect {role} address")]
    InvalidAddress { role: &'static str },
    #[error("ERC20: {0} from the zero address")]
    InvalidSender(Debit),
    #[error("ERC20: transfer to the zero address")]
    InvalidRecipient,
    #[error("ERC20: approve from the zero address")]
    InvalidOwner,
    #[error("ERC20: approve to the zero address")]
    InvalidSpender,
    #[error("ERC20: {0} amount exceeds balance")]
    InsufficientBalance(Debit),
    #[error("ERC20: {0} amount exceeds allowance")]
    InsufficientAllowance(Debit),
    #[error("ERC20: increased allowance overflows")]
    ArithmeticOverflow,
    #[error("ERC20: decreased allowance below zero")]
    AllowanceUnderflow,
    #[error("ERC20: transfer amount overflows recipient balance")]
    BalanceOverflow,
    #[error("state root mismatch: recorded {recorded}, computed {computed}")]
    StateRootMismatch { recorded: B256, computed: B256 },
    /// `balances` is `None` when the sum does not fit in 256 bits.
    #[error("balances sum to {} but total supply is {supply}", display_sum(.balances))]
    ConservationViolated {
        balances: Option<U256>,
        supply: U256,
    },
    #[error("total supply {supply} exceeds the initial supply")]
    SupplyAboveInitial { supply: U256 },
}

fn display_sum(sum: &Option<U256>) -> String {
    match sum {
        Some(sum) => sum.to_string(),
        None => "more than 2^256 - 1".to_string(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: U256,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceEntry {
    pub holder: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub total_supply: U256,
    pub balances: Vec<BalanceEntry>,
    pub allowances: Vec<AllowanceEntry>,
    pub events: Vec<LedgerEvent>,
    pub state_root: B256,
}

/// Balance and allowance bookkeeping for the token.
///
/// Every mutating method validates its whole precondition set before it
/// touches any map, so a returned error always means nothing changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    total_supply: U256,
    balances: BTreeMap<Address, U256>,
    allowances: BTreeMap<(Address, Address), U256>,
    events: Vec<LedgerEvent>,
}

impl Ledger {
    /// Mints [`INITIAL_SUPPLY`] to `wallet`. This is the only mint.
    pub fn genesis(wallet: Address) -> Result<Self, LedgerError> {
        if wallet.is_zero() {
            return Err(LedgerError::InvalidAddress { role: "wallet" });
        }
        let mut ledger = Self {
            total_supply: INITIAL_SUPPLY,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
        };
        ledger.balances.insert(wallet, INITIAL_SUPPLY);
        ledger.events.push(LedgerEvent::Transfer {
            from: Address::ZERO,
            to: wallet,
            value: INITIAL_SUPPLY,
        });
        debug!(%wallet, supply = %INITIAL_SUPPLY, "genesis mint");
        Ok(ledger)
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }

    pub fn transfer(
        &mut self,
        sender: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.ensure_transfer(sender, recipient, amount)?;
        self.move_balance(sender, recipient, amount)
    }

    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        ensure_approval_parties(owner, spender)?;
        self.set_allowance(owner, spender, amount);
        Ok(())
    }

    /// Moves `amount` from `owner` to `recipient` on behalf of `caller`,
    /// spending `caller`'s allowance. Only a Transfer event is logged.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        owner: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(owner, caller);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance(Debit::Transfer));
        }
        self.ensure_transfer(owner, recipient, amount)?;

        self.move_balance(owner, recipient, amount)?;
        self.allowances.insert((owner, caller), allowance - amount);
        Ok(())
    }

    pub fn increase_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        added: U256,
    ) -> Result<(), LedgerError> {
        ensure_approval_parties(owner, spender)?;
        let next = self
            .allowance(owner, spender)
            .checked_add(added)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.set_allowance(owner, spender, next);
        Ok(())
    }

    pub fn decrease_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        subtracted: U256,
    ) -> Result<(), LedgerError> {
        ensure_approval_parties(owner, spender)?;
        let next = self
            .allowance(owner, spender)
            .checked_sub(subtracted)
            .ok_or(LedgerError::AllowanceUnderflow)?;
        self.set_allowance(owner, spender, next);
        Ok(())
    }

    pub fn burn(&mut self, holder: Address, amount: U256) -> Result<(), LedgerError> {
        self.ensure_burn(holder, amount)?;
        self.destroy(holder, amount);
        Ok(())
    }

    /// Burns from `holder` on behalf of `caller`. The zero-holder check runs
    /// before the allowance check, and the allowance check before the balance
    /// check.
    pub fn burn_from(
        &mut self,
        caller: Address,
        holder: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if holder.is_zero() {
            return Err(LedgerError::InvalidOwner);
        }
        let allowance = self.allowance(holder, caller);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance(Debit::Burn));
        }
        self.ensure_burn(holder, amount)?;

        self.allowances.insert((holder, caller), allowance - amount);
        self.destroy(holder, amount);
        Ok(())
    }

    pub fn check_conservation(&self) -> Result<(), LedgerError> {
        let balances = self
            .balances
            .values()
            .try_fold(U256::ZERO, |acc, amount| acc.checked_add(*amount));
        if balances != Some(self.total_supply) {
            return Err(LedgerError::ConservationViolated {
                balances,
                supply: self.total_supply,
            });
        }
        Ok(())
    }

    pub fn state_root(&self) -> B256 {
        compute_state_root(
            self.total_supply,
            &self.balances,
            &self.allowances,
            &self.events,
        )
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            total_supply: self.total_supply,
            balances: self
                .balances
                .iter()
                .map(|(holder, amount)| BalanceEntry {
                    holder: *holder,
                    amount: *amount,
                })
                .collect(),
            allowances: self
                .allowances
                .iter()
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
            events: self.events.clone(),
            state_root: self.state_root(),
        }
    }

    /// Rebuilds a ledger from a snapshot, rejecting it when the recorded
    /// root does not match the entries and events, when the supply is above
    /// the genesis mint, or when the balances do not add up to the supply.
    pub fn restore(snapshot: &LedgerSnapshot) -> Result<Self, LedgerError> {
        let ledger = Self {
            total_supply: snapshot.total_supply,
            balances: snapshot
                .balances
                .iter()
                .map(|entry| (entry.holder, entry.amount))
                .collect(),
            allowances: snapshot
                .allowances
                .iter()
                .map(|entry| ((entry.owner, entry.spender), entry.amount))
                .collect(),
            events: snapshot.events.clone(),
        };
        let computed = ledger.state_root();
        if computed != snapshot.state_root {
            return Err(LedgerError::StateRootMismatch {
                recorded: snapshot.state_root,
                computed,
            });
        }
        if ledger.total_supply > INITIAL_SUPPLY {
            return Err(LedgerError::SupplyAboveInitial {
                supply: ledger.total_supply,
            });
        }
        ledger.check_conservation()?;
        Ok(ledger)
    }

    fn ensure_transfer(
        &self,
        sender: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if sender.is_zero() {
            return Err(LedgerError::InvalidSender(Debit::Transfer));
        }
        if recipient.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        if self.balance_of(sender) < amount {
            return Err(LedgerError::InsufficientBalance(Debit::Transfer));
        }
        Ok(())
    }

    fn ensure_burn(&self, holder: Address, amount: U256) -> Result<(), LedgerError> {
        if holder.is_zero() {
            return Err(LedgerError::InvalidSender(Debit::Burn));
        }
        if self.balance_of(holder) < amount {
            return Err(LedgerError::InsufficientBalance(Debit::Burn));
        }
        Ok(())
    }

    // Both sides are computed before either is written, so an error leaves
    // the ledger untouched.
    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if from == to {
            self.balances.entry(from).or_default();
        } else {
            let debited = self
                .balance_of(from)
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientBalance(Debit::Transfer))?;
            let credited = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::BalanceOverflow)?;
            self.balances.insert(from, debited);
            self.balances.insert(to, credited);
        }
        self.events.push(LedgerEvent::Transfer {
            from,
            to,
            value: amount,
        });
        debug!(%from, %to, %amount, "transfer applied");
        Ok(())
    }

    // Callers must have run ensure_burn.
    fn destroy(&mut self, holder: Address, amount: U256) {
        *self.balances.entry(holder).or_default() -= amount;
        self.total_supply -= amount;
        self.events.push(LedgerEvent::Transfer {
            from: holder,
            to: Address::ZERO,
            value: amount,
        });
        debug!(%holder, %amount, supply = %self.total_supply, "burn applied");
    }

    fn set_allowance(&mut self, owner: Address, spender: Address, value: U256) {
        self.allowances.insert((owner, spender), value);
        self.events.push(LedgerEvent::Approval {
            owner,
            spender,
            value,
        });
        debug!(%owner, %spender, %value, "allowance set");
    }
}

fn ensure_approval_parties(owner: Address, spender: Address) -> Result<(), LedgerError> {
    if owner.is_zero() {
        return Err(LedgerError::InvalidOwner);
    }
    if spender.is_zero() {
        return Err(LedgerError::InvalidSpender);
    }
    Ok(())
}

fn compute_state_root(
    total_supply: U256,
    balances: &BTreeMap<Address, U256>,
    allowances: &BTreeMap<(Address, Address), U256>,
    events: &[LedgerEvent],
) -> B256 {
    let mut leaves: Vec<[u8; 32]> =
        Vec::with_capacity(1 + balances.len() + allowances.len() + events.len());

    let mut hasher = Sha256::new();
    hasher.update(b"supply");
    hasher.update(total_supply.to_be_bytes::<32>());
    leaves.push(hasher.finalize().into());

    for (holder, amount) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"bal");
        hasher.update(holder.as_slice());
        hasher.update(amount.to_be_bytes::<32>());
        leaves.push(hasher.finalize().into());
    }
    for ((owner, spender), amount) in allowances {
        let mut hasher = Sha256::new();
        hasher.update(b"allow");
        hasher.update(owner.as_slice());
        hasher.update(spender.as_slice());
        hasher.update(amount.to_be_bytes::<32>());
        leaves.push(hasher.finalize().into());
    }
    // events keep their log order; the index pins each one to its position
    for (index, event) in events.iter().enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(b"event");
        hasher.update((index as u64).to_be_bytes());
        match event {
            LedgerEvent::Transfer { from, to, value } => {
                hasher.update(b"transfer");
                hasher.update(from.as_slice());
                hasher.update(to.as_slice());
                hasher.update(value.to_be_bytes::<32>());
            }
            LedgerEvent::Approval {
                owner,
                spender,
                value,
            } => {
                hasher.update(b"approval");
                hasher.update(owner.as_slice());
                hasher.update(spender.as_slice());
                hasher.update(value.to_be_bytes::<32>());
            }
        }
        leaves.push(hasher.finalize().into());
    }
    B256::from(build_merkle(leaves))
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"cprx-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn user(n: u8) -> Address {
        Address::repeat_byte(0x10 + n)
    }

    fn units(n: u64) -> U256 {
        U256::from(n)
    }

    // Builds a ledger directly, skipping genesis, to model a hand-edited state file.
    fn forged(supply: U256, balances: &[(Address, U256)]) -> Ledger {
        Ledger {
            total_supply: supply,
            balances: balances.iter().copied().collect(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    fn reseal(snapshot: &mut LedgerSnapshot) {
        let balances: BTreeMap<Address, U256> = snapshot
            .balances
            .iter()
            .map(|e| (e.holder, e.amount))
            .collect();
        let allowances: BTreeMap<(Address, Address), U256> = snapshot
            .allowances
            .iter()
            .map(|e| ((e.owner, e.spender), e.amount))
            .collect();
        snapshot.state_root = compute_state_root(
            snapshot.total_supply,
            &balances,
            &allowances,
            &snapshot.events,
        );
    }

    #[test]
    fn initial_supply_is_three_billion_tokens() {
        let expected: U256 = "3000000000000000000000000000".parse().unwrap();
        assert_eq!(INITIAL_SUPPLY, expected);
    }

    #[test]
    fn genesis_credits_wallet_and_logs_mint() {
        let ledger = Ledger::genesis(wallet()).unwrap();
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY);
        assert_eq!(ledger.balance_of(wallet()), INITIAL_SUPPLY);
        assert_eq!(
            ledger.events(),
            &[LedgerEvent::Transfer {
                from: Address::ZERO,
                to: wallet(),
                value: INITIAL_SUPPLY,
            }]
        );
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn genesis_rejects_zero_wallet() {
        let err = Ledger::genesis(Address::ZERO).unwrap_err();
        assert_eq!(err, LedgerError::InvalidAddress { role: "wallet" });
        assert_eq!(err.to_string(), "CPRX: incorrect wallet address");
    }

    #[test]
    fn transfers_chain_through_holders() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.transfer(wallet(), user(1), units(1_000)).unwrap();
        ledger.transfer(user(1), user(2), units(500)).unwrap();

        let expected_wallet: U256 = "2999999999999999999999999000".parse().unwrap();
        assert_eq!(ledger.balance_of(wallet()), expected_wallet);
        assert_eq!(ledger.balance_of(user(1)), units(500));
        assert_eq!(ledger.balance_of(user(2)), units(500));
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY);
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn transfer_rejections_leave_state_untouched() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        let before = ledger.clone();

        let err = ledger
            .transfer(wallet(), Address::ZERO, units(1_000))
            .unwrap_err();
        assert_eq!(err.to_string(), "ERC20: transfer to the zero address");

        let err = ledger
            .transfer(wallet(), user(1), INITIAL_SUPPLY + units(1))
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance(Debit::Transfer));
        assert_eq!(err.to_string(), "ERC20: transfer amount exceeds balance");

        let err = ledger
            .transfer(Address::ZERO, user(1), U256::ZERO)
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidSender(Debit::Transfer));

        assert_eq!(ledger, before);
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.transfer(wallet(), wallet(), units(42)).unwrap();
        assert_eq!(ledger.balance_of(wallet()), INITIAL_SUPPLY);
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn approve_is_last_write_wins() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        ledger.approve(wallet(), user(1), units(300)).unwrap();
        assert_eq!(ledger.allowance(wallet(), user(1)), units(300));
        assert_eq!(ledger.allowance(user(1), wallet()), U256::ZERO);
    }

    #[test]
    fn approve_rejects_zero_parties() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        assert_eq!(
            ledger.approve(Address::ZERO, user(1), units(1)).unwrap_err(),
            LedgerError::InvalidOwner
        );
        let err = ledger.approve(wallet(), Address::ZERO, units(1)).unwrap_err();
        assert_eq!(err.to_string(), "ERC20: approve to the zero address");
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        let logged = ledger.events().len();

        ledger
            .transfer_from(user(1), wallet(), user(1), units(1_000))
            .unwrap();
        assert_eq!(ledger.allowance(wallet(), user(1)), U256::ZERO);
        assert_eq!(ledger.balance_of(user(1)), units(1_000));
        assert_eq!(
            &ledger.events()[logged..],
            &[LedgerEvent::Transfer {
                from: wallet(),
                to: user(1),
                value: units(1_000),
            }]
        );
    }

    #[test]
    fn transfer_from_checks_allowance_first() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        let err = ledger
            .transfer_from(wallet(), wallet(), user(1), units(1_000))
            .unwrap_err();
        assert_eq!(err.to_string(), "ERC20: transfer amount exceeds allowance");

        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        let err = ledger
            .transfer_from(user(1), wallet(), user(1), units(1_001))
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientAllowance(Debit::Transfer));

        // allowance suffices, recipient does not
        let err = ledger
            .transfer_from(user(1), wallet(), Address::ZERO, units(10))
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidRecipient);
        assert_eq!(ledger.allowance(wallet(), user(1)), units(1_000));
    }

    #[test]
    fn transfer_from_rejects_balance_shortfall_without_spending() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(user(2), user(1), units(50)).unwrap();
        let err = ledger
            .transfer_from(user(1), user(2), user(3), units(50))
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance(Debit::Transfer));
        assert_eq!(ledger.allowance(user(2), user(1)), units(50));
    }

    #[test]
    fn increase_then_decrease_restores_allowance() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        ledger.increase_allowance(wallet(), user(1), units(1_000)).unwrap();
        assert_eq!(ledger.allowance(wallet(), user(1)), units(2_000));
        ledger.decrease_allowance(wallet(), user(1), units(1_500)).unwrap();
        assert_eq!(ledger.allowance(wallet(), user(1)), units(500));
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::Approval {
                owner: wallet(),
                spender: user(1),
                value: units(500),
            })
        );
    }

    #[test]
    fn increase_allowance_overflow_is_rejected() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        let err = ledger
            .increase_allowance(wallet(), user(1), U256::MAX)
            .unwrap_err();
        assert_eq!(err, LedgerError::ArithmeticOverflow);
        assert_eq!(ledger.allowance(wallet(), user(1)), units(1_000));
    }

    #[test]
    fn decrease_allowance_below_zero_is_rejected() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        let logged = ledger.events().len();
        let err = ledger
            .decrease_allowance(wallet(), user(1), units(2_000))
            .unwrap_err();
        assert_eq!(err.to_string(), "ERC20: decreased allowance below zero");
        assert_eq!(ledger.allowance(wallet(), user(1)), units(1_000));
        assert_eq!(ledger.events().len(), logged);
    }

    #[test]
    fn burn_reduces_supply_and_logs_zero_destination() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.burn(wallet(), units(1_000)).unwrap();
        let expected: U256 = "2999999999999999999999999000".parse().unwrap();
        assert_eq!(ledger.balance_of(wallet()), expected);
        assert_eq!(ledger.total_supply(), expected);
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::Transfer {
                from: wallet(),
                to: Address::ZERO,
                value: units(1_000),
            })
        );
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn burn_past_balance_fails() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        let err = ledger.burn(user(1), units(1)).unwrap_err();
        assert_eq!(err.to_string(), "ERC20: burn amount exceeds balance");
        assert!(ledger
            .burn(wallet(), INITIAL_SUPPLY + units(1))
            .is_err());
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY);
    }

    #[test]
    fn burn_from_check_order() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();

        // zero holder wins over the allowance check, whatever the amount
        for amount in [U256::ZERO, units(1_000)] {
            let err = ledger
                .burn_from(user(1), Address::ZERO, amount)
                .unwrap_err();
            assert_eq!(err.to_string(), "ERC20: approve from the zero address");
        }

        let err = ledger.burn_from(user(1), wallet(), units(1_000)).unwrap_err();
        assert_eq!(err.to_string(), "ERC20: burn amount exceeds allowance");

        let oversized = INITIAL_SUPPLY + units(1_000);
        ledger.approve(wallet(), user(1), oversized).unwrap();
        let err = ledger.burn_from(user(1), wallet(), oversized).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance(Debit::Burn));
        assert_eq!(ledger.allowance(wallet(), user(1)), oversized);
    }

    #[test]
    fn burn_from_decrements_allowance_and_balance() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.approve(wallet(), user(1), units(1_000)).unwrap();
        ledger.burn_from(user(1), wallet(), units(400)).unwrap();
        assert_eq!(ledger.allowance(wallet(), user(1)), units(600));
        assert_eq!(ledger.balance_of(wallet()), INITIAL_SUPPLY - units(400));
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY - units(400));
    }

    #[test]
    fn state_root_is_deterministic_and_tracks_state() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        let root1 = ledger.state_root();
        assert_eq!(root1, ledger.state_root());
        ledger.approve(wallet(), user(1), units(5)).unwrap();
        assert_ne!(root1, ledger.state_root());
    }

    #[test]
    fn snapshot_restores_identical_ledger() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.transfer(wallet(), user(1), units(77)).unwrap();
        ledger.approve(user(1), user(2), units(10)).unwrap();
        let snapshot = ledger.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Ledger::restore(&decoded).unwrap();
        assert_eq!(restored, ledger);
    }

    #[test]
    fn restore_rejects_tampered_balances() {
        let ledger = Ledger::genesis(wallet()).unwrap();
        let mut snapshot = ledger.snapshot();
        snapshot.balances.push(BalanceEntry {
            holder: user(9),
            amount: units(1),
        });
        assert!(matches!(
            Ledger::restore(&snapshot),
            Err(LedgerError::StateRootMismatch { .. })
        ));

        // a consistent root over inconsistent supply still fails
        reseal(&mut snapshot);
        assert!(matches!(
            Ledger::restore(&snapshot),
            Err(LedgerError::ConservationViolated { .. })
        ));
    }

    #[test]
    fn restore_rejects_balances_summing_past_u256() {
        let overfull = [(user(1), U256::MAX), (user(2), units(5))];
        let snapshot = forged(INITIAL_SUPPLY, &overfull).snapshot();
        assert_eq!(
            Ledger::restore(&snapshot),
            Err(LedgerError::ConservationViolated {
                balances: None,
                supply: INITIAL_SUPPLY,
            })
        );

        let ledger = forged(U256::MAX, &overfull);
        assert!(matches!(
            ledger.check_conservation(),
            Err(LedgerError::ConservationViolated { balances: None, .. })
        ));
    }

    #[test]
    fn restore_rejects_supply_above_initial() {
        let inflated = INITIAL_SUPPLY * U256::from(1_000u64);
        let snapshot = forged(inflated, &[(wallet(), inflated)]).snapshot();
        assert_eq!(
            Ledger::restore(&snapshot),
            Err(LedgerError::SupplyAboveInitial { supply: inflated })
        );
    }

    #[test]
    fn restore_rejects_tampered_events() {
        let mut ledger = Ledger::genesis(wallet()).unwrap();
        ledger.transfer(wallet(), user(1), units(10)).unwrap();
        ledger.approve(user(1), user(2), units(3)).unwrap();

        let mut snapshot = ledger.snapshot();
        snapshot.events[1] = LedgerEvent::Transfer {
            from: wallet(),
            to: user(2),
            value: units(10),
        };
        assert!(matches!(
            Ledger::restore(&snapshot),
            Err(LedgerError::StateRootMismatch { .. })
        ));

        let mut snapshot = ledger.snapshot();
        snapshot.events.swap(1, 2);
        assert!(matches!(
            Ledger::restore(&snapshot),
            Err(LedgerError::StateRootMismatch { .. })
        ));

        let mut snapshot = ledger.snapshot();
        snapshot.events.pop();
        assert!(matches!(
            Ledger::restore(&snapshot),
            Err(LedgerError::StateRootMismatch { .. })
        ));
    }

    #[test]
    fn transfer_rejects_recipient_overflow_without_side_effects() {
        let mut ledger = forged(U256::MAX, &[(user(1), U256::MAX), (user(2), units(5))]);
        ledger.approve(user(2), user(3), units(5)).unwrap();
        let before = ledger.clone();

        assert_eq!(
            ledger.transfer(user(2), user(1), units(5)),
            Err(LedgerError::BalanceOverflow)
        );
        assert_eq!(
            ledger.transfer_from(user(3), user(2), user(1), units(5)),
            Err(LedgerError::BalanceOverflow)
        );
        assert_eq!(ledger, before);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Transfer(u8, u8, u64),
            Approve(u8, u8, u64),
            TransferFrom(u8, u8, u8, u64),
            Burn(u8, u64),
            BurnFrom(u8, u8, u64),
        }

        fn party(n: u8) -> Address {
            // 0 maps to the zero address so rejections get exercised too
            if n == 0 {
                Address::ZERO
            } else {
                Address::repeat_byte(n)
            }
        }

        fn op() -> impl Strategy<Value = Op> {
            let who = 0u8..5;
            prop_oneof![
                (who.clone(), who.clone(), any::<u64>()).prop_map(|(a, b, v)| Op::Transfer(a, b, v)),
                (who.clone(), who.clone(), any::<u64>()).prop_map(|(a, b, v)| Op::Approve(a, b, v)),
                (who.clone(), who.clone(), who.clone(), any::<u64>())
                    .prop_map(|(a, b, c, v)| Op::TransferFrom(a, b, c, v)),
                (who.clone(), any::<u64>()).prop_map(|(a, v)| Op::Burn(a, v)),
                (who.clone(), who, any::<u64>()).prop_map(|(a, b, v)| Op::BurnFrom(a, b, v)),
            ]
        }

        fn seeded() -> Ledger {
            let mut ledger = Ledger::genesis(party(1)).unwrap();
            for n in 2..5 {
                ledger.transfer(party(1), party(n), U256::from(u64::MAX)).unwrap();
            }
            ledger
        }

        proptest! {
            #[test]
            fn prop_supply_is_conserved(ops in proptest::collection::vec(op(), 1..40)) {
                let mut ledger = seeded();
                for op in ops {
                    let before = ledger.clone();
                    let result = match op {
                        Op::Transfer(a, b, v) => ledger.transfer(party(a), party(b), U256::from(v)),
                        Op::Approve(a, b, v) => ledger.approve(party(a), party(b), U256::from(v)),
                        Op::TransferFrom(c, a, b, v) => {
                            ledger.transfer_from(party(c), party(a), party(b), U256::from(v))
                        }
                        Op::Burn(a, v) => ledger.burn(party(a), U256::from(v)),
                        Op::BurnFrom(c, a, v) => ledger.burn_from(party(c), party(a), U256::from(v)),
                    };
                    if result.is_err() {
                        prop_assert_eq!(&ledger, &before);
                    }
                    prop_assert!(ledger.check_conservation().is_ok());
                }
            }
        }

        proptest! {
            #[test]
            fn prop_increase_decrease_round_trip(start in any::<u64>(), delta in any::<u64>()) {
                let mut ledger = seeded();
                ledger.approve(party(1), party(2), U256::from(start)).unwrap();
                ledger.increase_allowance(party(1), party(2), U256::from(delta)).unwrap();
                ledger.decrease_allowance(party(1), party(2), U256::from(delta)).unwrap();
                prop_assert_eq!(ledger.allowance(party(1), party(2)), U256::from(start));
            }
        }

        proptest! {
            #[test]
            fn prop_transfer_preserves_pair_sum(amount in any::<u64>(), from in 1u8..5, to in 1u8..5) {
                let mut ledger = seeded();
                let pair = |l: &Ledger| l.balance_of(party(from)) + l.balance_of(party(to));
                let before = pair(&ledger);
                if ledger.transfer(party(from), party(to), U256::from(amount)).is_ok() {
                    prop_assert_eq!(pair(&ledger), before);
                }
                prop_assert_eq!(ledger.total_supply(), INITIAL_SUPPLY);
            }
        }
    }
}
