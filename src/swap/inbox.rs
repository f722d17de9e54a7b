use crate::{
    parameters::{ParameterValue, SubTxIndex, TxParameterId},
    swap::bridge::{BridgeError, Completion},
    wallet::TxFailureReason,
};
use std::{
    cell::RefCell,
    collections::{HashSet, VecDeque},
    rc::Rc,
};
use tracing::{debug, warn};

/// Asynchronous calls a swap can have outstanding, at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    SwapAddress,
    PrivateKey,
    BlockCount,
    CreateLockTx,
    FundLockTx,
    SignLockTx,
    CreateWithdrawTx(SubTxIndex),
    SendRawTx(SubTxIndex),
    TxOut(SubTxIndex),
    RegisterKernel(SubTxIndex),
    ConfirmKernel(SubTxIndex),
    GetKernel(SubTxIndex),
}

impl Request {
    pub fn sub(self) -> SubTxIndex {
        match self {
            Request::SwapAddress | Request::PrivateKey | Request::BlockCount => SubTxIndex::Default,
            Request::CreateLockTx | Request::FundLockTx | Request::SignLockTx => SubTxIndex::LockTx,
            Request::CreateWithdrawTx(sub)
            | Request::SendRawTx(sub)
            | Request::TxOut(sub)
            | Request::RegisterKernel(sub)
            | Request::ConfirmKernel(sub)
            | Request::GetKernel(sub) => sub,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Param(SubTxIndex, TxParameterId, ParameterValue),
    ForeignHeight(u64),
    Failed(SubTxIndex, TxFailureReason),
}

impl Update {
    pub fn param(sub: SubTxIndex, id: TxParameterId, value: impl crate::parameters::Parameter) -> Self {
        Update::Param(sub, id, value.into_value())
    }
}

/// Results of completed calls waiting to be applied on the next update.
#[derive(Debug, Default)]
pub struct Inbox {
    updates: VecDeque<Update>,
    in_flight: HashSet<Request>,
}

pub type SharedInbox = Rc<RefCell<Inbox>>;

impl Inbox {
    pub fn shared() -> SharedInbox {
        Rc::new(RefCell::new(Inbox::default()))
    }

    pub fn is_in_flight(&self, request: Request) -> bool {
        self.in_flight.contains(&request)
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }

    pub fn take_updates(&mut self) -> Vec<Update> {
        self.updates.drain(..).collect()
    }
}

/// Starts tracking `request`, returning the completion to hand to the bridge,
/// or `None` while the same request is still outstanding.
pub fn track<T: 'static>(
    inbox: &SharedInbox,
    request: Request,
    handle: impl FnOnce(T) -> Vec<Update> + 'static,
) -> Option<Completion<T>> {
    let done = track_native(inbox, request, move |result: Result<T, BridgeError>| match result {
        Ok(value) => handle(value),
        Err(e) if e.is_fatal() => {
            warn!("{} {:?} failed: {}", request.sub(), request, e);
            vec![Update::Failed(request.sub(), e.failure_reason())]
        }
        Err(e) => {
            debug!("{} {:?} will be retried: {}", request.sub(), request, e);
            Vec::new()
        }
    })?;

    Some(done)
}

pub fn track_native<T: 'static>(
    inbox: &SharedInbox,
    request: Request,
    handle: impl FnOnce(T) -> Vec<Update> + 'static,
) -> Option<Box<dyn FnOnce(T)>> {
    if !inbox.borrow_mut().in_flight.insert(request) {
        return None;
    }

    let inbox = Rc::downgrade(inbox);
    Some(Box::new(move |value| {
        // the transaction may be gone by the time a call completes
        if let Some(inbox) = inbox.upgrade() {
            let updates = handle(value);
            let mut inbox = inbox.borrow_mut();
            inbox.in_flight.remove(&request);
            inbox.updates.extend(updates);
        }
    }))
}
