use cid::Cid;
pub use error::TokenError;
use fvm_actor_utils::messaging::MessagingError;
use fvm_actor_utils::syscalls::Syscalls;
use fvm_actor_utils::util::ActorRuntime;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::ActorID;
use log::{debug, info, warn};
use num_traits::Zero;

use self::state::{StateError as TokenStateError, StateInvariantError, StateSummary, TokenState};
use self::types::{
    BurnReturn, InitializeParams, MintReturn, StakeReturn, TokenConfig, TransferReturn,
    UnstakeReturn,
};

mod error;
pub mod state;
pub mod types;

/// Upper bound for the fee configured at initialization, i.e. 100%
pub const MAX_FEE_BASIS_POINTS: u64 = 10_000;

type Result<T> = std::result::Result<T, TokenError>;

/// Library functions that implement a token ledger with per-account staking
///
/// Holds injectable services to access/interface with IPLD/FVM layer.
pub struct Token<'st, S, BS>
where
    S: Syscalls,
    BS: Blockstore,
{
    /// Runtime services to interact with the execution environment
    runtime: ActorRuntime<S, BS>,
    /// Reference to token state that will be inspected/mutated
    state: &'st mut TokenState,
}

impl<'st, S, BS> Token<'st, S, BS>
where
    S: Syscalls,
    BS: Blockstore,
{
    /// Creates a new clean token state instance
    ///
    /// This should be wrapped in a Token handle for convenience. Must be flushed to the blockstore
    /// explicitly to persist changes
    pub fn create_state(bs: &BS) -> Result<TokenState> {
        Ok(TokenState::new(bs)?)
    }

    /// Creates a new clean token state instance, specifying the underlying Hamt bit widths
    ///
    /// This should be wrapped in a Token handle for convenience. Must be flushed to the blockstore
    /// explicitly to persist changes
    pub fn create_state_with_bit_width(bs: &BS, hamt_bit_width: u32) -> Result<TokenState> {
        Ok(TokenState::new_with_bit_width(bs, hamt_bit_width)?)
    }

    /// Wrap an existing token state
    pub fn wrap(runtime: ActorRuntime<S, BS>, state: &'st mut TokenState) -> Self {
        Self { runtime, state }
    }

    /// Replace the current state with another
    /// The previous state is returned and can be safely dropped
    pub fn replace(&mut self, state: TokenState) -> TokenState {
        std::mem::replace(self.state, state)
    }

    /// For an already initialised state tree, loads the state tree from the blockstore at a Cid
    pub fn load_state(bs: &BS, state_cid: &Cid) -> Result<TokenState> {
        Ok(TokenState::load(bs, state_cid)?)
    }

    /// Loads a fresh copy of the state from a blockstore from a given cid, replacing existing state
    /// The old state is returned to enable comparisons and the like but can be safely dropped
    /// otherwise
    pub fn load_replace(&mut self, cid: &Cid) -> Result<TokenState> {
        let new_state = TokenState::load(&self.runtime, cid)?;
        Ok(std::mem::replace(self.state, new_state))
    }

    /// Flush state and return Cid for root
    pub fn flush(&mut self) -> Result<Cid> {
        Ok(self.state.save(&self.runtime)?)
    }

    /// Get a reference to the wrapped state tree
    pub fn state(&self) -> &TokenState {
        self.state
    }

    /// Get a reference to the underlying runtime
    pub fn runtime(&self) -> &ActorRuntime<S, BS> {
        &self.runtime
    }

    /// Opens an atomic transaction on TokenState which allows a closure to make multiple
    /// modifications to the state tree.
    ///
    /// If the closure returns an error, the transaction is dropped atomically and no change is
    /// observed on token state.
    fn transaction<F, Res>(&mut self, f: F) -> Result<Res>
    where
        F: FnOnce(&mut TokenState, &ActorRuntime<S, BS>) -> Result<Res>,
    {
        let mut mutable_state = self.state.clone();
        let res = f(&mut mutable_state, &self.runtime)?;
        // if closure didn't error, save state
        *self.state = mutable_state;
        Ok(res)
    }

    /// Returns the ledger configuration, failing if the ledger hasn't been initialized
    fn require_initialized(&self) -> Result<&TokenConfig> {
        match &self.state.config {
            Some(config) => Ok(config),
            None => {
                warn!("rejected operation on uninitialized ledger f0{}", self.runtime.actor_id());
                Err(TokenError::NotInitialized)
            }
        }
    }

    /// Resolves an address that must already hold ledger state, without creating an account
    ///
    /// Addresses unknown to the environment can't hold a balance or a stake entry, so they resolve
    /// to None.
    fn resolve_holder(&self, address: &Address) -> Result<Option<ActorID>> {
        match self.runtime.resolve_id(address) {
            Ok(id) => Ok(Some(id)),
            Err(MessagingError::AddressNotResolved(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl<'st, S, BS> Token<'st, S, BS>
where
    S: Syscalls,
    BS: Blockstore,
{
    /// Performs the one-time setup of the ledger
    ///
    /// - The initial supply, cap and reserve MUST be non-negative
    /// - The initial supply and reserve MUST NOT exceed the cap
    /// - The fee MUST NOT exceed [`MAX_FEE_BASIS_POINTS`]
    /// - The self reference MUST resolve to this ledger actor
    ///
    /// Upon success the owner's balance and the total supply equal the initial supply. Calling
    /// this a second time fails with [`TokenError::AlreadyInitialized`] and changes nothing.
    ///
    /// Returns the owner's new balance
    pub fn initialize(&mut self, params: InitializeParams) -> Result<TokenAmount> {
        if self.state.config.is_some() {
            warn!("rejected re-initialization of ledger f0{}", self.runtime.actor_id());
            return Err(TokenError::AlreadyInitialized);
        }

        let initial_supply = validate_amount(&params.initial_supply, "initial supply")?;
        let cap = validate_amount(&params.cap, "cap")?;
        let reserved = validate_amount(&params.reserved, "reserved")?;
        if initial_supply > cap {
            return Err(TokenError::CapExceeded {
                cap: cap.clone(),
                supply: TokenAmount::zero(),
                delta: initial_supply.clone(),
            });
        }
        if reserved > cap {
            return Err(TokenError::InvalidConfig(format!(
                "reserved amount {} exceeds the cap {}",
                reserved, cap
            )));
        }
        if params.fee_basis_points > MAX_FEE_BASIS_POINTS {
            return Err(TokenError::InvalidConfig(format!(
                "fee of {} basis points exceeds {}",
                params.fee_basis_points, MAX_FEE_BASIS_POINTS
            )));
        }
        let own_address = Address::new_id(self.runtime.actor_id());
        if !self.runtime.same_address(&params.self_reference, &own_address) {
            return Err(TokenError::InvalidSelfReference(params.self_reference));
        }

        let owner = self.runtime.resolve_or_init(&params.owner)?;
        let config = TokenConfig {
            owner,
            cap: cap.clone(),
            reserved: reserved.clone(),
            rate: params.rate,
            fee_basis_points: params.fee_basis_points,
            self_reference: params.self_reference,
        };

        let balance = self.transaction(|state, bs| {
            let balance = state.change_balance_by(bs, owner, initial_supply)?;
            state.change_supply_by(initial_supply)?;
            state.config = Some(config);
            Ok(balance)
        })?;

        info!(
            "initialized ledger f0{} with supply {} owned by f0{}",
            self.runtime.actor_id(),
            initial_supply,
            owner
        );
        Ok(balance)
    }

    /// Returns the configuration fixed at initialization, if any
    pub fn config(&self) -> Option<&TokenConfig> {
        self.state.config.as_ref()
    }

    /// Gets the total number of tokens in existence
    ///
    /// This equals the sum of `balance_of` and `stake_of` over all addresses
    pub fn total_supply(&self) -> TokenAmount {
        self.state.supply.clone()
    }

    /// Gets the sum of all stakes
    pub fn total_staked(&self) -> TokenAmount {
        self.state.staked.clone()
    }

    /// Returns the spendable balance associated with a particular address
    ///
    /// Accounts that have never received transfers implicitly have a zero-balance
    pub fn balance_of(&self, owner: &Address) -> Result<TokenAmount> {
        // Don't instantiate an account if unable to resolve to an ID address, as non-initialized
        // addresses have an implicit zero balance
        match self.runtime.resolve_id(owner) {
            Ok(owner) => Ok(self.state.get_balance(&self.runtime, owner)?),
            Err(MessagingError::AddressNotResolved(_)) => {
                // uninitialized address has implicit zero balance
                Ok(TokenAmount::zero())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the amount an address currently has staked
    ///
    /// Accounts that never staked implicitly have a zero stake
    pub fn stake_of(&self, owner: &Address) -> Result<TokenAmount> {
        match self.runtime.resolve_id(owner) {
            Ok(owner) => {
                Ok(self.state.get_stake(&self.runtime, owner)?.unwrap_or_else(TokenAmount::zero))
            }
            Err(MessagingError::AddressNotResolved(_)) => Ok(TokenAmount::zero()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether an address may stake, i.e. its stake bookkeeping was initialized
    pub fn is_balance_initialized(&self, owner: &Address) -> Result<bool> {
        match self.runtime.resolve_id(owner) {
            Ok(owner) => Ok(self.state.get_stake(&self.runtime, owner)?.is_some()),
            Err(MessagingError::AddressNotResolved(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Transfers an amount of spendable tokens from one address to another
    ///
    /// - The requested value MUST be non-negative
    /// - The requested value MUST NOT exceed the sender's spendable balance
    ///
    /// Upon successful transfer:
    /// - The from balance decreases by the requested value
    /// - The to balance increases by the requested value
    /// - Stakes of both accounts are unchanged
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferReturn> {
        self.require_initialized()?;
        let amount = validate_amount(amount, "transfer")?;

        let from_id = self.runtime.resolve_or_init(from)?;
        let to_id = self.runtime.resolve_or_init(to)?;
        let ret = self.transaction(|state, bs| {
            // don't change balance if to == from, but must check that the transfer doesn't exceed
            // balance
            if to_id == from_id {
                let balance = state.get_balance(bs, from_id)?;
                if balance.lt(amount) {
                    return Err(TokenStateError::InsufficientBalance {
                        owner: from_id,
                        balance,
                        delta: -amount,
                    }
                    .into());
                }
                Ok(TransferReturn { from_balance: balance.clone(), to_balance: balance })
            } else {
                let to_balance = state.change_balance_by(bs, to_id, amount)?;
                let from_balance = state.change_balance_by(bs, from_id, &-amount)?;
                Ok(TransferReturn { from_balance, to_balance })
            }
        })?;

        debug!("transferred {} from f0{} to f0{}", amount, from_id, to_id);
        Ok(ret)
    }

    /// Prepares an account's stake bookkeeping so that it may stake
    ///
    /// Initializing an account that already has bookkeeping is a no-op. Returns the account's
    /// current stake.
    pub fn initialize_balance(&mut self, owner: &Address) -> Result<TokenAmount> {
        self.require_initialized()?;

        let owner = self.runtime.resolve_or_init(owner)?;
        let stake = self.transaction(|state, bs| Ok(state.initialize_stake(bs, owner)?))?;

        debug!("initialized stake bookkeeping for f0{}", owner);
        Ok(stake)
    }

    /// Locks an amount of the account's spendable balance as stake
    ///
    /// - The requested value MUST be non-negative
    /// - The requested value MUST NOT exceed the account's spendable balance
    /// - The account's bookkeeping MUST have been initialized with `initialize_balance`
    ///
    /// Upon success the balance decreases and the stake increases by the requested value
    pub fn stake(&mut self, owner: &Address, amount: &TokenAmount) -> Result<StakeReturn> {
        self.require_initialized()?;
        let amount = validate_amount(amount, "stake")?;

        let owner = match self.resolve_holder(owner)? {
            Some(id) => id,
            None => return Err(TokenError::AccountNotInitialized(*owner)),
        };
        let ret = self.transaction(|state, bs| {
            let stake = state.stake(bs, owner, amount)?;
            let balance = state.get_balance(bs, owner)?;
            Ok(StakeReturn { balance, stake })
        })?;

        debug!("f0{} staked {}, now staking {}", owner, amount, ret.stake);
        Ok(ret)
    }

    /// Returns the account's entire stake to its spendable balance
    ///
    /// Fails if the account has nothing staked. The stake entry is kept at zero so the account may
    /// stake again without re-initializing.
    pub fn unstake(&mut self, owner: &Address) -> Result<UnstakeReturn> {
        self.require_initialized()?;

        let owner = match self.resolve_holder(owner)? {
            Some(id) => id,
            None => return Err(TokenError::AccountNotInitialized(*owner)),
        };
        let ret = self.transaction(|state, bs| {
            let unstaked = state.unstake(bs, owner)?;
            let balance = state.get_balance(bs, owner)?;
            Ok(UnstakeReturn { balance, unstaked })
        })?;

        debug!("f0{} unstaked {}", owner, ret.unstaked);
        Ok(ret)
    }

    /// Mints new tokens into an account
    ///
    /// Only the owner set at initialization may mint, and the total supply may never exceed the
    /// configured cap.
    pub fn mint(
        &mut self,
        operator: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<MintReturn> {
        let config = self.require_initialized()?;
        let (owner, cap) = (config.owner, config.cap.clone());
        let amount = validate_amount(amount, "mint")?;

        // an operator that can't be resolved can't be the owner
        match self.runtime.resolve_id(operator) {
            Ok(id) if id == owner => {}
            _ => return Err(TokenError::Unauthorized(*operator)),
        }
        if &self.state.supply + amount > cap {
            return Err(TokenError::CapExceeded {
                cap,
                supply: self.state.supply.clone(),
                delta: amount.clone(),
            });
        }

        let to_id = self.runtime.resolve_or_init(to)?;
        let ret = self.transaction(|state, bs| {
            let balance = state.change_balance_by(bs, to_id, amount)?;
            let supply = state.change_supply_by(amount)?.clone();
            Ok(MintReturn { balance, supply })
        })?;

        debug!("minted {} to f0{}", amount, to_id);
        Ok(ret)
    }

    /// Burns an amount of spendable tokens from the specified address, decreasing total supply
    ///
    /// - The requested value MUST be non-negative
    /// - The requested value MUST NOT exceed the target's spendable balance
    pub fn burn(&mut self, owner: &Address, amount: &TokenAmount) -> Result<BurnReturn> {
        self.require_initialized()?;
        let amount = validate_amount(amount, "burn")?;

        let owner = match self.resolve_holder(owner)? {
            Some(id) => id,
            // an unknown address holds nothing, so only a zero burn can succeed
            None if amount.is_zero() => return Ok(BurnReturn { balance: TokenAmount::zero() }),
            None => {
                return Err(TokenError::InsufficientBalance {
                    owner: *owner,
                    balance: TokenAmount::zero(),
                    delta: -amount,
                })
            }
        };
        let ret = self.transaction(|state, bs| {
            let balance = state.change_balance_by(bs, owner, &-amount)?;
            state.change_supply_by(&-amount)?;
            Ok(BurnReturn { balance })
        })?;

        debug!("burned {} from f0{}", amount, owner);
        Ok(ret)
    }

    /// Checks the state invariants, returning a state summary or the first violation found
    pub fn check_invariants(
        &self,
    ) -> std::result::Result<StateSummary<'_, ActorRuntime<S, BS>>, StateInvariantError> {
        self.state.check_invariants(&self.runtime)
    }
}

/// Validates that a token amount for staking/transfer/minting/burning is non-negative
///
/// Returns the argument, or an error.
pub fn validate_amount<'a>(a: &'a TokenAmount, name: &'static str) -> Result<&'a TokenAmount> {
    if a.is_negative() {
        return Err(TokenError::InvalidNegative { name, amount: a.clone() });
    }
    Ok(a)
}
