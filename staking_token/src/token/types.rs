use fvm_ipld_encoding::tuple::{Deserialize_tuple, Serialize_tuple};
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::ActorID;

/// The external interface of a token ledger that lets holders lock part of their balance as stake
///
/// This represents the call/response surface exposed to other actors. Token authors implement this
/// trait over a [`Token`](crate::token::Token) handle and link the methods to their own dispatch.
pub trait StakingToken {
    type TokenError;

    /// One-time setup of the ledger, crediting the initial supply to the owner
    ///
    /// Must fail if the ledger has already been initialized.
    fn initialize(
        &mut self,
        params: InitializeParams,
    ) -> Result<InitializeReturn, Self::TokenError>;

    /// Returns the total amount of the token in existence, staked or not
    fn total_supply(&mut self) -> TotalSupplyReturn;

    /// Returns the sum of all staked amounts
    fn total_staked(&mut self) -> TotalStakedReturn;

    /// Returns the spendable balance of an address
    ///
    /// Balance is always non-negative. Uninitialised addresses have an implicit zero balance.
    fn balance_of(&mut self, params: Address) -> Result<BalanceReturn, Self::TokenError>;

    /// Returns the amount an address currently has staked
    fn stake_of(&mut self, params: Address) -> Result<StakeOfReturn, Self::TokenError>;

    /// Transfers spendable tokens from the caller to another address
    ///
    /// Amount must be non-negative (but can be zero). Staked amounts of either party are never
    /// touched.
    fn transfer(&mut self, params: TransferParams) -> Result<TransferReturn, Self::TokenError>;

    /// Prepares an address's stake bookkeeping so that it may stake
    fn initialize_balance(
        &mut self,
        params: Address,
    ) -> Result<InitializeBalanceReturn, Self::TokenError>;

    /// Moves an amount of the account's spendable balance into its stake
    fn stake(&mut self, params: StakeParams) -> Result<StakeReturn, Self::TokenError>;

    /// Returns the account's entire stake to its spendable balance
    fn unstake(&mut self, params: Address) -> Result<UnstakeReturn, Self::TokenError>;
}

pub type TotalSupplyReturn = TokenAmount;
pub type TotalStakedReturn = TokenAmount;
pub type BalanceReturn = TokenAmount;
pub type StakeOfReturn = TokenAmount;
/// The stake held by the account once its bookkeeping exists
pub type InitializeBalanceReturn = TokenAmount;
/// The owner's balance after the initial supply was credited
pub type InitializeReturn = TokenAmount;

/// Ledger parameters fixed at initialization
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TokenConfig {
    /// The account that received the initial supply and may mint
    pub owner: ActorID,
    /// Upper bound on the total supply
    pub cap: TokenAmount,
    /// Amount held back from circulation by the issuer
    pub reserved: TokenAmount,
    /// Issuance rate, informational to the ledger
    pub rate: u64,
    /// Fee charged by the issuer, in hundredths of a percent
    pub fee_basis_points: u64,
    /// Address of the ledger actor itself
    pub self_reference: Address,
}

/// Parameters of the one-time ledger setup
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct InitializeParams {
    pub owner: Address,
    pub initial_supply: TokenAmount,
    pub cap: TokenAmount,
    pub reserved: TokenAmount,
    pub rate: u64,
    pub fee_basis_points: u64,
    /// Must resolve to the ledger actor's own id
    pub self_reference: Address,
}

/// Instruction to transfer tokens to another address
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct TransferParams {
    pub to: Address,
    /// A non-negative amount to transfer
    pub amount: TokenAmount,
}

/// Return value after a successful transfer
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferReturn {
    /// The new balance of the `from` address
    pub from_balance: TokenAmount,
    /// The new balance of the `to` address
    pub to_balance: TokenAmount,
}

/// Instruction to lock part of an account's spendable balance
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct StakeParams {
    pub account: Address,
    /// A non-negative amount to stake
    pub amount: TokenAmount,
}

/// Return value after a successful stake
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct StakeReturn {
    /// The new spendable balance of the account
    pub balance: TokenAmount,
    /// The new staked amount of the account
    pub stake: TokenAmount,
}

/// Return value after a successful unstake
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct UnstakeReturn {
    /// The new spendable balance of the account
    pub balance: TokenAmount,
    /// The amount that was returned from stake
    pub unstaked: TokenAmount,
}

/// Return value after a successful mint
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct MintReturn {
    /// The new balance of the recipient
    pub balance: TokenAmount,
    /// The new total supply
    pub supply: TokenAmount,
}

/// Return value after a successful burn
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct BurnReturn {
    /// New balance in the account after the successful burn
    pub balance: TokenAmount,
}
