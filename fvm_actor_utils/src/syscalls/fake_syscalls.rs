use std::{cell::RefCell, collections::HashMap};

use cid::Cid;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::{Address, Payload};
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::{ErrorNumber, ExitCode};
use fvm_shared::{ActorID, MethodNum, Response};
use num_traits::Zero;

use super::{NoStateError, Syscalls};

/// The first f0 address handed out to actors instantiated by the fake environment
pub const FIRST_ALLOCATED_ACTOR_ID: ActorID = 100;

#[derive(Clone, Debug)]
pub struct TestMessage {
    pub to: Address,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub value: TokenAmount,
}

/// An in-memory execution environment with deterministic account provisioning and native balances
#[derive(Clone, Debug)]
pub struct FakeSyscalls {
    /// The root of the calling actor
    pub root: RefCell<Cid>,
    /// The f0 ID of the calling actor
    pub actor_id: ActorID,

    /// A map of addresses that were instantiated in this runtime
    pub addresses: RefCell<HashMap<Address, ActorID>>,
    /// The next-to-allocate f0 address
    pub next_actor_id: RefCell<ActorID>,
    /// Native-currency balances of actors known to the environment
    pub balances: RefCell<HashMap<ActorID, TokenAmount>>,

    /// The last message sent via this runtime
    pub last_message: RefCell<Option<TestMessage>>,
    /// Flag to control message success
    pub abort_next_send: RefCell<bool>,
}

impl Default for FakeSyscalls {
    fn default() -> Self {
        Self {
            root: Default::default(),
            actor_id: 0,
            addresses: Default::default(),
            next_actor_id: RefCell::new(FIRST_ALLOCATED_ACTOR_ID),
            balances: Default::default(),
            last_message: Default::default(),
            abort_next_send: Default::default(),
        }
    }
}

impl FakeSyscalls {
    /// Creates an environment in which the calling actor has the given ID
    pub fn with_actor_id(actor_id: ActorID) -> Self {
        Self { actor_id, ..Default::default() }
    }

    /// Overwrites the native balance of an actor, creating it if it didn't exist
    pub fn set_balance(&self, actor_id: ActorID, amount: TokenAmount) {
        self.balances.borrow_mut().insert(actor_id, amount);
    }

    /// Resolves or allocates an ID for a message recipient
    ///
    /// Sending to public keys instantiates the actor, sending to an f0 or f2 address assumes the
    /// actor already exists.
    fn resolve_recipient(&self, to: &Address) -> Result<ActorID, ErrorNumber> {
        match to.payload() {
            Payload::ID(id) => Ok(*id),
            Payload::Actor(_) => {
                self.addresses.borrow().get(to).copied().ok_or(ErrorNumber::NotFound)
            }
            _ => {
                let mut map = self.addresses.borrow_mut();
                let id = match map.get(to) {
                    Some(id) => *id,
                    None => {
                        let actor_id = self.next_actor_id.replace_with(|old| *old + 1);
                        map.insert(*to, actor_id);
                        actor_id
                    }
                };
                Ok(id)
            }
        }
    }
}

impl Syscalls for FakeSyscalls {
    fn root(&self) -> Result<Cid, NoStateError> {
        Ok(*self.root.borrow())
    }

    fn set_root(&self, cid: &Cid) -> Result<(), NoStateError> {
        self.root.replace(*cid);
        Ok(())
    }

    fn receiver(&self) -> ActorID {
        self.actor_id
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Response, ErrorNumber> {
        if self.abort_next_send.replace(false) {
            return Err(ErrorNumber::AssertionFailed);
        }
        if value.is_negative() {
            return Err(ErrorNumber::IllegalArgument);
        }

        let recipient = self.resolve_recipient(to)?;

        if !value.is_zero() {
            let mut balances = self.balances.borrow_mut();
            let available = balances.get(&self.actor_id).cloned().unwrap_or_default();
            if available < value {
                return Err(ErrorNumber::InsufficientFunds);
            }
            balances.insert(self.actor_id, &available - &value);
            let credited = balances.entry(recipient).or_default();
            *credited += value.clone();
        }

        // save the fake message as being sent
        let message = TestMessage { to: *to, method, params: params.clone(), value };
        self.last_message.replace(Some(message));

        // echo the params back as return data
        Ok(Response { exit_code: ExitCode::OK, return_data: params })
    }

    fn resolve_address(&self, addr: &Address) -> Option<ActorID> {
        // if it is already an ID-address, just return it
        if let Payload::ID(id) = addr.payload() {
            return Some(*id);
        }

        let map = self.addresses.borrow();
        map.get(addr).copied()
    }

    fn balance_of(&self, actor_id: ActorID) -> Option<TokenAmount> {
        self.balances.borrow().get(&actor_id).cloned()
    }
}
