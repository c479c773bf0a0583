use fvm_actor_utils::messaging::MessagingError;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use thiserror::Error;

use crate::token::state::StateError as TokenStateError;
use crate::token::state::StateInvariantError;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("error in underlying state {0}")]
    TokenState(#[from] TokenStateError),
    #[error("value {amount:?} for {name:?} must be non-negative")]
    InvalidNegative { name: &'static str, amount: TokenAmount },
    #[error("the ledger has not been initialized")]
    NotInitialized,
    #[error("the ledger has already been initialized")]
    AlreadyInitialized,
    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),
    #[error("self reference {0} does not resolve to the ledger actor")]
    InvalidSelfReference(Address),
    #[error("{0} is not permitted to mint")]
    Unauthorized(Address),
    #[error("adding {delta:?} to a supply of {supply:?} would exceed the cap of {cap:?}")]
    CapExceeded { cap: TokenAmount, supply: TokenAmount, delta: TokenAmount },
    #[error("stake bookkeeping for {0} has not been initialized")]
    AccountNotInitialized(Address),
    #[error("{owner} holds {balance:?}, cannot apply delta of {delta:?}")]
    InsufficientBalance { owner: Address, balance: TokenAmount, delta: TokenAmount },
    #[error("error calling other actor: {0}")]
    Messaging(#[from] MessagingError),
    #[error("error in state invariants {0}")]
    StateInvariant(#[from] StateInvariantError),
}

impl From<&TokenError> for ExitCode {
    fn from(error: &TokenError) -> Self {
        match error {
            TokenError::InvalidNegative { name: _, amount: _ }
            | TokenError::InvalidConfig(_)
            | TokenError::InvalidSelfReference(_)
            | TokenError::CapExceeded { cap: _, supply: _, delta: _ } => {
                ExitCode::USR_ILLEGAL_ARGUMENT
            }
            TokenError::NotInitialized
            | TokenError::AlreadyInitialized
            | TokenError::AccountNotInitialized(_) => ExitCode::USR_ILLEGAL_STATE,
            TokenError::InsufficientBalance { owner: _, balance: _, delta: _ } => {
                ExitCode::USR_INSUFFICIENT_FUNDS
            }
            TokenError::Unauthorized(_) => ExitCode::USR_FORBIDDEN,
            TokenError::StateInvariant(_) => ExitCode::USR_ILLEGAL_STATE,
            TokenError::Messaging(messaging_error) => messaging_error.into(),
            TokenError::TokenState(state_error) => match state_error {
                TokenStateError::IpldHamt(_) | TokenStateError::Serialization(_) => {
                    ExitCode::USR_SERIALIZATION
                }
                TokenStateError::NegativeStake { amount: _, owner: _ } => {
                    ExitCode::USR_ILLEGAL_ARGUMENT
                }
                TokenStateError::NegativeTotalSupply { supply: _, delta: _ }
                | TokenStateError::NegativeTotalStaked { staked: _, delta: _ }
                | TokenStateError::AccountNotInitialized(_)
                | TokenStateError::NothingStaked(_)
                | TokenStateError::MissingState(_) => ExitCode::USR_ILLEGAL_STATE,
                TokenStateError::InsufficientBalance { balance: _, delta: _, owner: _ } => {
                    ExitCode::USR_INSUFFICIENT_FUNDS
                }
            },
        }
    }
}

#[cfg(test)]
mod test {
    use fvm_shared::address::Address;
    use fvm_shared::econ::TokenAmount;
    use fvm_shared::error::ExitCode;

    use crate::token::TokenError;
    use crate::token::TokenStateError;

    #[test]
    fn it_creates_exit_codes() {
        let error = TokenError::TokenState(TokenStateError::MissingState(cid::Cid::default()));
        let msg = error.to_string();
        let exit_code = ExitCode::from(&error);
        // taking the exit code doesn't consume the error
        println!("{}: {:?}", msg, exit_code);
        assert_eq!(exit_code, ExitCode::USR_ILLEGAL_STATE);
    }

    #[test]
    fn it_reports_lifecycle_failures_as_illegal_state() {
        assert_eq!(ExitCode::from(&TokenError::NotInitialized), ExitCode::USR_ILLEGAL_STATE);
        assert_eq!(ExitCode::from(&TokenError::AlreadyInitialized), ExitCode::USR_ILLEGAL_STATE);
        let error = TokenError::TokenState(TokenStateError::NothingStaked(3));
        assert_eq!(ExitCode::from(&error), ExitCode::USR_ILLEGAL_STATE);
        let error = TokenError::AccountNotInitialized(Address::new_id(3));
        assert_eq!(ExitCode::from(&error), ExitCode::USR_ILLEGAL_STATE);
    }

    #[test]
    fn it_reports_overdrafts_as_insufficient_funds() {
        let error = TokenError::TokenState(TokenStateError::InsufficientBalance {
            owner: 3,
            balance: TokenAmount::from_atto(300),
            delta: TokenAmount::from_atto(-301),
        });
        assert_eq!(ExitCode::from(&error), ExitCode::USR_INSUFFICIENT_FUNDS);

        let error = TokenError::InsufficientBalance {
            owner: Address::new_id(3),
            balance: TokenAmount::from_atto(0),
            delta: TokenAmount::from_atto(-1),
        };
        assert_eq!(ExitCode::from(&error), ExitCode::USR_INSUFFICIENT_FUNDS);
    }
}
