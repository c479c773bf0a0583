use fvm_actor_utils::syscalls::fake_syscalls::FakeSyscalls;
use fvm_actor_utils::syscalls::{NoStateError, Syscalls};
use fvm_actor_utils::util::ActorRuntime;
use fvm_ipld_blockstore::MemoryBlockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use staking_token::token::state::TokenState;
use staking_token::token::types::{
    BalanceReturn, InitializeBalanceReturn, InitializeParams, InitializeReturn, StakeOfReturn,
    StakeParams, StakeReturn, StakingToken, TotalStakedReturn, TotalSupplyReturn, TransferParams,
    TransferReturn, UnstakeReturn,
};
use staking_token::token::{Token, TokenError};
use thiserror::Error;

pub const LEDGER_ACTOR_ID: u64 = 1;

#[derive(Error, Debug)]
pub enum ActorError {
    #[error("token error: {0}")]
    Token(#[from] TokenError),
    #[error("state error: {0}")]
    NoState(#[from] NoStateError),
}

/// A ledger actor that keeps its state in a blockstore between calls, reloading it from the
/// environment's state root each time
pub struct StakingTokenActor {
    pub syscalls: FakeSyscalls,
    pub blockstore: MemoryBlockstore,
    /// The address calls are made from
    pub caller: Address,
}

impl StakingTokenActor {
    /// Creates the actor with an empty ledger state already committed as its root
    pub fn deploy() -> Self {
        let actor = StakingTokenActor {
            syscalls: FakeSyscalls::with_actor_id(LEDGER_ACTOR_ID),
            blockstore: MemoryBlockstore::default(),
            caller: Address::new_id(0),
        };
        let state = TokenState::new(&actor.blockstore).unwrap();
        let cid = state.save(&actor.blockstore).unwrap();
        actor.syscalls.set_root(&cid).unwrap();
        actor
    }

    /// Sets the address subsequent calls are made from
    pub fn call_as(&mut self, caller: &Address) -> &mut Self {
        self.caller = *caller;
        self
    }

    fn runtime(&self) -> ActorRuntime<&FakeSyscalls, &MemoryBlockstore> {
        ActorRuntime::new(&self.syscalls, &self.blockstore)
    }

    /// Loads the committed state, runs the operation and commits the result on success
    fn with_token<F, Res>(&self, f: F) -> Result<Res, ActorError>
    where
        F: FnOnce(&mut Token<&FakeSyscalls, &MemoryBlockstore>) -> Result<Res, TokenError>,
    {
        let runtime = self.runtime();
        let root = runtime.root_cid()?;
        let mut state = TokenState::load(&self.blockstore, &root).map_err(TokenError::from)?;
        let mut token = Token::wrap(runtime, &mut state);
        let res = f(&mut token)?;
        let cid = token.flush()?;
        token.runtime().set_root(&cid)?;
        Ok(res)
    }

    /// Returns the currently committed state
    pub fn state(&self) -> TokenState {
        let root = self.syscalls.root().unwrap();
        TokenState::load(&self.blockstore, &root).unwrap()
    }

    /// Panics if the committed state violates any ledger invariant
    pub fn assert_invariants(&self) {
        let mut state = self.state();
        let token = Token::wrap(self.runtime(), &mut state);
        token.check_invariants().unwrap();
    }
}

impl StakingToken for StakingTokenActor {
    type TokenError = ActorError;

    fn initialize(&mut self, params: InitializeParams) -> Result<InitializeReturn, ActorError> {
        self.with_token(|token| token.initialize(params))
    }

    fn total_supply(&mut self) -> TotalSupplyReturn {
        self.state().supply
    }

    fn total_staked(&mut self) -> TotalStakedReturn {
        self.state().staked
    }

    fn balance_of(&mut self, params: Address) -> Result<BalanceReturn, ActorError> {
        self.with_token(|token| token.balance_of(&params))
    }

    fn stake_of(&mut self, params: Address) -> Result<StakeOfReturn, ActorError> {
        self.with_token(|token| token.stake_of(&params))
    }

    fn transfer(&mut self, params: TransferParams) -> Result<TransferReturn, ActorError> {
        let caller = self.caller;
        self.with_token(|token| token.transfer(&caller, &params.to, &params.amount))
    }

    fn initialize_balance(
        &mut self,
        params: Address,
    ) -> Result<InitializeBalanceReturn, ActorError> {
        self.with_token(|token| token.initialize_balance(&params))
    }

    fn stake(&mut self, params: StakeParams) -> Result<StakeReturn, ActorError> {
        self.with_token(|token| token.stake(&params.account, &params.amount))
    }

    fn unstake(&mut self, params: Address) -> Result<UnstakeReturn, ActorError> {
        self.with_token(|token| token.unstake(&params))
    }
}

/// Parameters for a ledger owned by `owner` with a generous cap
pub fn init_params(owner: &Address, initial_supply: i64) -> InitializeParams {
    InitializeParams {
        owner: *owner,
        initial_supply: TokenAmount::from_atto(initial_supply),
        cap: TokenAmount::from_atto(1_000_000),
        reserved: TokenAmount::from_atto(100),
        rate: 1000,
        fee_basis_points: 2,
        self_reference: Address::new_id(LEDGER_ACTOR_ID),
    }
}
