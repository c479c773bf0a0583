use cid::Cid;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::{address::Address, econ::TokenAmount, error::ErrorNumber, ActorID, MethodNum};
use fvm_shared::Response;
use thiserror::Error;

pub mod fake_syscalls;

/// Copied to avoid linking against `fvm_sdk` for non-WASM targets
#[derive(Copy, Clone, Debug, Error)]
#[error("actor does not exist in state-tree")]
pub struct NoStateError;

/// The Syscalls trait defines methods available to the actor from its execution environment.
///
/// The methods available are a subset of the methods exported by `fvm_sdk`, plus a native balance
/// query so that value transfers made through the environment can be observed.
pub trait Syscalls {
    /// Get the IPLD root CID. Fails if the actor doesn't have state (before the first call to
    /// `set_root` and after actor deletion).
    fn root(&self) -> Result<Cid, NoStateError>;

    /// Set the actor's state-tree root.
    ///
    /// Fails if the new root is not in the actor's "reachable" set.
    fn set_root(&self, cid: &Cid) -> Result<(), NoStateError>;

    /// Returns the ID address of the actor
    fn receiver(&self) -> ActorID;

    /// Sends a message to an actor, transferring `value` of native currency from this actor
    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Response, ErrorNumber>;

    /// Resolves the ID address of an actor.
    ///
    /// Returns None if the address cannot be resolved. Successfully resolving an address doesn't
    /// necessarily mean the actor exists (e.g., if the addresss was already an actor ID).
    fn resolve_address(&self, addr: &Address) -> Option<ActorID>;

    /// Returns the native-currency balance held by an actor
    ///
    /// Returns None if the actor does not exist.
    fn balance_of(&self, actor_id: ActorID) -> Option<TokenAmount>;
}

/// Shared references to an environment are themselves an environment, allowing a single set of
/// syscalls to back many short-lived runtime handles
impl<S: Syscalls> Syscalls for &S {
    fn root(&self) -> Result<Cid, NoStateError> {
        (**self).root()
    }

    fn set_root(&self, cid: &Cid) -> Result<(), NoStateError> {
        (**self).set_root(cid)
    }

    fn receiver(&self) -> ActorID {
        (**self).receiver()
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Response, ErrorNumber> {
        (**self).send(to, method, params, value)
    }

    fn resolve_address(&self, addr: &Address) -> Option<ActorID> {
        (**self).resolve_address(addr)
    }

    fn balance_of(&self, actor_id: ActorID) -> Option<TokenAmount> {
        (**self).balance_of(actor_id)
    }
}
