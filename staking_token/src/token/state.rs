use anyhow::bail;
use cid::Cid;
use fvm_ipld_blockstore::Block;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::CborStore;
use fvm_ipld_encoding::DAG_CBOR;
use fvm_ipld_hamt::Hamt;
use fvm_ipld_hamt::{BytesKey, Error as HamtError};
use fvm_shared::econ::TokenAmount;
use fvm_shared::ActorID;
use integer_encoding::VarInt;
use multihash::Code;
use num_traits::Zero;
use thiserror::Error;

use crate::token::types::TokenConfig;

/// This value has been chosen to optimise to reduce gas-costs when accessing the balance and stake
/// maps. Ledgers with unusual holder distributions might find a different value to be more
/// efficient.
pub const DEFAULT_HAMT_BIT_WIDTH: u32 = 3;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("ipld hamt error: {0}")]
    IpldHamt(#[from] HamtError),
    #[error("missing state at cid: {0}")]
    MissingState(Cid),
    #[error("underlying serialization error: {0}")]
    Serialization(String),
    #[error(
        "negative balance caused by decreasing {owner:?}'s balance of {balance:?} by {delta:?}"
    )]
    InsufficientBalance { owner: ActorID, balance: TokenAmount, delta: TokenAmount },
    #[error("total_supply cannot be negative, cannot apply delta of {delta:?} to {supply:?}")]
    NegativeTotalSupply { supply: TokenAmount, delta: TokenAmount },
    #[error("total staked cannot be negative, cannot apply delta of {delta:?} to {staked:?}")]
    NegativeTotalStaked { staked: TokenAmount, delta: TokenAmount },
    #[error("stake cannot be negative, cannot stake {amount:?} for {owner:?}")]
    NegativeStake { amount: TokenAmount, owner: ActorID },
    #[error("stake bookkeeping for {0:?} has not been initialized")]
    AccountNotInitialized(ActorID),
    #[error("{0:?} has nothing staked")]
    NothingStaked(ActorID),
}

#[derive(Error, Debug)]
pub enum StateInvariantError {
    #[error("total supply was negative: {0}")]
    SupplyNegative(TokenAmount),
    #[error("total staked was negative: {0}")]
    StakedNegative(TokenAmount),
    #[error("the account for {account:?} had a negative balance of {balance:?}")]
    BalanceNegative { account: ActorID, balance: TokenAmount },
    #[error("stored a zero balance which should have been removed for {0}")]
    ExplicitZeroBalance(ActorID),
    #[error("the account for {account:?} had a negative stake of {stake:?}")]
    StakeNegative { account: ActorID, stake: TokenAmount },
    #[error("the total staked {staked:?} does not match the sum of all stakes {stake_sum:?}")]
    StakedMismatch { staked: TokenAmount, stake_sum: TokenAmount },
    #[error(
        "the total supply {supply:?} does not match balances {balance_sum:?} plus stakes {staked:?}"
    )]
    BalanceSupplyMismatch { supply: TokenAmount, balance_sum: TokenAmount, staked: TokenAmount },
    #[error("the total supply {supply:?} exceeds the cap {cap:?}")]
    SupplyExceedsCap { supply: TokenAmount, cap: TokenAmount },
    #[error("tokens exist but the ledger was never initialized")]
    Uninitialized,
    #[error("invalid serialized owner key {0:?}")]
    InvalidOwnerKey(BytesKey),
    #[error("underlying state error {0}")]
    State(#[from] StateError),
}

type Result<T> = std::result::Result<T, StateError>;

type Map<'bs, BS, K, V> = Hamt<&'bs BS, V, K>;
type BalanceMap<'bs, BS> = Map<'bs, BS, BytesKey, TokenAmount>;
type StakeMap<'bs, BS> = Map<'bs, BS, BytesKey, TokenAmount>;

/// Staking token state IPLD structure
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TokenState {
    /// Total supply of token, spendable and staked
    pub supply: TokenAmount,
    /// Sum of all stakes
    pub staked: TokenAmount,
    /// Map<ActorId, TokenAmount> of spendable balances as a Hamt
    pub balances: Cid,
    /// Map<ActorId, TokenAmount> of stakes as a Hamt. An entry (possibly zero) exists for every
    /// account whose stake bookkeeping was initialized
    pub stakes: Cid,
    /// Set once by ledger initialization
    pub config: Option<TokenConfig>,
    /// Bit-width to use when loading Hamts
    hamt_bit_width: u32,
}

/// An abstraction over the IPLD layer to get and modify ledger state without dealing with HAMTs
/// etc.
///
/// Lifecycle checks (whether the ledger was initialized, who may mint) are left to the caller.
/// Non-negative balances, stakes and totals are enforced here.
impl TokenState {
    /// Create a new token state-tree, without committing it (the root cid) to a blockstore
    pub fn new<BS: Blockstore>(store: &BS) -> Result<Self> {
        Self::new_with_bit_width(store, DEFAULT_HAMT_BIT_WIDTH)
    }

    /// Create a new token state-tree, without committing it (the root cid) to a blockstore
    ///
    /// Explicitly sets the bit width of underlying Hamt structures. Caller must ensure
    /// 1 <= hamt_bit_width <= 8.
    pub fn new_with_bit_width<BS: Blockstore>(store: &BS, hamt_bit_width: u32) -> Result<Self> {
        // Blockstore is still needed to create valid Cids for the Hamts
        let empty_balance_map = BalanceMap::new_with_bit_width(store, hamt_bit_width).flush()?;
        let empty_stake_map = StakeMap::new_with_bit_width(store, hamt_bit_width).flush()?;

        Ok(Self {
            supply: Default::default(),
            staked: Default::default(),
            balances: empty_balance_map,
            stakes: empty_stake_map,
            config: None,
            hamt_bit_width,
        })
    }

    /// Loads a fresh copy of the state from a blockstore from a given cid
    pub fn load<BS: Blockstore>(bs: &BS, cid: &Cid) -> Result<Self> {
        match bs.get_cbor::<Self>(cid) {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(StateError::MissingState(*cid)),
            Err(err) => Err(StateError::Serialization(err.to_string())),
        }
    }

    /// Saves the current state to the blockstore, returning the cid
    pub fn save<BS: Blockstore>(&self, bs: &BS) -> Result<Cid> {
        let serialized = match fvm_ipld_encoding::to_vec(self) {
            Ok(s) => s,
            Err(err) => return Err(StateError::Serialization(err.to_string())),
        };
        let block = Block { codec: DAG_CBOR, data: serialized };
        let cid = match bs.put(Code::Blake2b256, &block) {
            Ok(cid) => cid,
            Err(err) => return Err(StateError::Serialization(err.to_string())),
        };
        Ok(cid)
    }

    /// Get the spendable balance of an ActorID from the currently stored state
    pub fn get_balance<BS: Blockstore>(&self, bs: &BS, owner: ActorID) -> Result<TokenAmount> {
        let balances = self.get_balance_map(bs)?;

        let balance = match balances.get(&actor_id_key(owner))? {
            Some(amount) => amount.clone(),
            None => TokenAmount::zero(),
        };

        Ok(balance)
    }

    /// Changes the spendable balance of the specified account by the delta
    ///
    /// Caller must ensure that the sign of of the delta is consistent with token rules (i.e.
    /// negative transfers, burns etc. are not allowed). Returns the new balance of the account.
    pub fn change_balance_by<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: ActorID,
        delta: &TokenAmount,
    ) -> Result<TokenAmount> {
        if delta.is_zero() {
            // This is a no-op as far as mutating state
            return self.get_balance(bs, owner);
        }

        let mut balance_map = self.get_balance_map(bs)?;
        let owner_key = actor_id_key(owner);
        let balance = match balance_map.get(&owner_key)? {
            Some(amount) => amount.clone(),
            None => TokenAmount::zero(),
        };

        let new_balance = &balance + delta;

        if new_balance.is_negative() {
            return Err(StateError::InsufficientBalance { balance, delta: delta.clone(), owner });
        }

        if new_balance.is_zero() {
            balance_map.delete(&owner_key)?;
        } else {
            balance_map.set(owner_key, new_balance.clone())?;
        }

        self.balances = balance_map.flush()?;

        Ok(new_balance)
    }

    /// Retrieve the balance map as a HAMT
    pub fn get_balance_map<'bs, BS: Blockstore>(&self, bs: &'bs BS) -> Result<BalanceMap<'bs, BS>> {
        Ok(BalanceMap::load_with_bit_width(&self.balances, bs, self.hamt_bit_width)?)
    }

    /// Retrieve the number of accounts holding a spendable balance
    ///
    /// This involves iterating through the entire HAMT
    pub fn count_balances<BS: Blockstore>(&self, bs: &BS) -> Result<usize> {
        let mut count = 0;
        self.get_balance_map(bs)?.for_each(|_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Increase/decrease the total supply by the specified value
    ///
    /// Returns the new total supply
    pub fn change_supply_by(&mut self, delta: &TokenAmount) -> Result<&TokenAmount> {
        let new_supply = &self.supply + delta;
        if new_supply.is_negative() {
            return Err(StateError::NegativeTotalSupply {
                supply: self.supply.clone(),
                delta: delta.clone(),
            });
        }

        self.supply = new_supply;
        Ok(&self.supply)
    }

    /// Get the stake of an ActorID
    ///
    /// Returns None if the account's stake bookkeeping was never initialized
    pub fn get_stake<BS: Blockstore>(
        &self,
        bs: &BS,
        owner: ActorID,
    ) -> Result<Option<TokenAmount>> {
        let stakes = self.get_stake_map(bs)?;
        Ok(stakes.get(&actor_id_key(owner))?.cloned())
    }

    /// Creates an explicit zero stake entry for the account if it doesn't have one
    ///
    /// Returns the account's current stake. An existing stake is never reset.
    pub fn initialize_stake<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: ActorID,
    ) -> Result<TokenAmount> {
        let mut stake_map = self.get_stake_map(bs)?;
        let owner_key = actor_id_key(owner);
        if let Some(existing) = stake_map.get(&owner_key)? {
            return Ok(existing.clone());
        }

        stake_map.set(owner_key, TokenAmount::zero())?;
        self.stakes = stake_map.flush()?;
        Ok(TokenAmount::zero())
    }

    /// Moves an amount from the account's spendable balance into its stake
    ///
    /// Fails if the account's stake was never initialized or its balance is insufficient, leaving
    /// state untouched. Returns the new stake.
    pub fn stake<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: ActorID,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        if amount.is_negative() {
            return Err(StateError::NegativeStake { amount: amount.clone(), owner });
        }

        let mut stake_map = self.get_stake_map(bs)?;
        let owner_key = actor_id_key(owner);
        let current = match stake_map.get(&owner_key)? {
            Some(stake) => stake.clone(),
            None => return Err(StateError::AccountNotInitialized(owner)),
        };

        // fails before anything is written if the balance can't cover the stake
        self.change_balance_by(bs, owner, &-amount)?;

        let new_stake = &current + amount;
        stake_map.set(owner_key, new_stake.clone())?;
        self.stakes = stake_map.flush()?;
        self.staked = &self.staked + amount;

        Ok(new_stake)
    }

    /// Returns the account's entire stake to its spendable balance, leaving a zero stake entry
    ///
    /// Returns the amount that was unstaked
    pub fn unstake<BS: Blockstore>(&mut self, bs: &BS, owner: ActorID) -> Result<TokenAmount> {
        let mut stake_map = self.get_stake_map(bs)?;
        let owner_key = actor_id_key(owner);
        let current = match stake_map.get(&owner_key)? {
            Some(stake) => stake.clone(),
            None => return Err(StateError::AccountNotInitialized(owner)),
        };

        if current.is_zero() {
            return Err(StateError::NothingStaked(owner));
        }

        let new_staked = &self.staked - &current;
        if new_staked.is_negative() {
            return Err(StateError::NegativeTotalStaked {
                staked: self.staked.clone(),
                delta: -current,
            });
        }

        stake_map.set(owner_key, TokenAmount::zero())?;
        self.stakes = stake_map.flush()?;
        self.staked = new_staked;
        self.change_balance_by(bs, owner, &current)?;

        Ok(current)
    }

    /// Retrieve the stake map as a HAMT
    pub fn get_stake_map<'bs, BS: Blockstore>(&self, bs: &'bs BS) -> Result<StakeMap<'bs, BS>> {
        Ok(StakeMap::load_with_bit_width(&self.stakes, bs, self.hamt_bit_width)?)
    }

    /// Checks that the current state obeys all system invariants
    ///
    /// Checks that there are no zero balances explicitly stored in the blockstore. Checks that
    /// balances, stakes and totals are never negative. Checks that the stakes add up to the total
    /// staked and that balances plus the total staked match total_supply. Checks that the supply
    /// is within the configured cap and that no tokens exist before initialization.
    ///
    /// Returns a state summary that can be used to check application specific invariants.
    pub fn check_invariants<'bs, BS: Blockstore>(
        &self,
        bs: &'bs BS,
    ) -> std::result::Result<StateSummary<'bs, BS>, StateInvariantError> {
        if self.supply.is_negative() {
            return Err(StateInvariantError::SupplyNegative(self.supply.clone()));
        }
        if self.staked.is_negative() {
            return Err(StateInvariantError::StakedNegative(self.staked.clone()));
        }

        match &self.config {
            Some(config) if self.supply > config.cap => {
                return Err(StateInvariantError::SupplyExceedsCap {
                    supply: self.supply.clone(),
                    cap: config.cap.clone(),
                });
            }
            None if !self.supply.is_zero() => return Err(StateInvariantError::Uninitialized),
            _ => {}
        }

        // check balances
        let mut balance_sum = TokenAmount::zero();
        let mut maybe_err: Option<StateInvariantError> = None;
        let balances = self.get_balance_map(bs)?;
        let res = balances.for_each(|owner_key, balance| {
            let owner = match decode_actor_id(owner_key) {
                None => {
                    maybe_err = Some(StateInvariantError::InvalidOwnerKey(owner_key.clone()));
                    bail!("invariant failed");
                }
                Some(a) => a,
            };
            if balance.is_negative() {
                maybe_err = Some(StateInvariantError::BalanceNegative {
                    account: owner,
                    balance: balance.clone(),
                });
                bail!("invariant failed")
            }
            // zero balances should not be stored in the Hamt
            if balance.is_zero() {
                maybe_err = Some(StateInvariantError::ExplicitZeroBalance(owner));
                bail!("invariant failed")
            }

            balance_sum = &balance_sum + balance;
            Ok(())
        });

        if let Err(e) = res {
            return Err(maybe_err.unwrap_or(StateInvariantError::State(e.into())));
        }

        // check stakes, zero entries are expected for initialized accounts
        let mut stake_sum = TokenAmount::zero();
        let mut maybe_err: Option<StateInvariantError> = None;
        let stakes = self.get_stake_map(bs)?;
        let res = stakes.for_each(|owner_key, stake| {
            let owner = match decode_actor_id(owner_key) {
                None => {
                    maybe_err = Some(StateInvariantError::InvalidOwnerKey(owner_key.clone()));
                    bail!("invariant failed");
                }
                Some(a) => a,
            };
            if stake.is_negative() {
                maybe_err = Some(StateInvariantError::StakeNegative {
                    account: owner,
                    stake: stake.clone(),
                });
                bail!("invariant failed")
            }

            stake_sum = &stake_sum + stake;
            Ok(())
        });

        if let Err(e) = res {
            return Err(maybe_err.unwrap_or(StateInvariantError::State(e.into())));
        }

        if stake_sum != self.staked {
            return Err(StateInvariantError::StakedMismatch {
                staked: self.staked.clone(),
                stake_sum,
            });
        }

        if &balance_sum + &self.staked != self.supply {
            return Err(StateInvariantError::BalanceSupplyMismatch {
                supply: self.supply.clone(),
                balance_sum,
                staked: self.staked.clone(),
            });
        }

        Ok(StateSummary {
            balance_map: self.get_balance_map(bs)?,
            stake_map: self.get_stake_map(bs)?,
            total_supply: self.supply.clone(),
            total_staked: self.staked.clone(),
        })
    }
}

pub fn actor_id_key(a: ActorID) -> BytesKey {
    a.encode_var_vec().into()
}

pub fn decode_actor_id(key: &BytesKey) -> Option<ActorID> {
    u64::decode_var(key.0.as_slice()).map(|a| a.0)
}

/// A summary of the current state to allow checking application specific invariants
pub struct StateSummary<'bs, BS>
where
    BS: Blockstore,
{
    pub balance_map: BalanceMap<'bs, BS>,
    pub stake_map: StakeMap<'bs, BS>,
    pub total_supply: TokenAmount,
    pub total_staked: TokenAmount,
}
