//! Connection registry (C5): sessions looked up by address, RFCOMM cid, or
//! HCI connection handle.
//!
//! Grounded in the same shape the teacher's transport layer uses for its own
//! client map (a primary `HashMap` keyed by the thing that identifies a peer,
//! with auxiliary indexes for secondary keys) rather than the intrusive
//! linked list the distilled source used — see design note §9.

use std::collections::HashMap;

use crate::address::DeviceAddress;
use crate::session::Session;

/// Sessions keyed primarily by `remote_addr`, with O(1) auxiliary lookup by
/// `rfcomm_cid` and `con_handle` (§4.5).
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<DeviceAddress, Session>,
    by_cid: HashMap<u16, DeviceAddress>,
    by_handle: HashMap<u16, DeviceAddress>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: returns the existing session for `addr` or creates one.
    pub fn provide(&mut self, addr: DeviceAddress) -> &mut Session {
        self.sessions.entry(addr).or_insert_with(|| Session::new(addr))
    }

    pub fn by_addr(&self, addr: DeviceAddress) -> Option<&Session> {
        self.sessions.get(&addr)
    }

    pub fn by_addr_mut(&mut self, addr: DeviceAddress) -> Option<&mut Session> {
        self.sessions.get_mut(&addr)
    }

    pub fn by_cid(&self, cid: u16) -> Option<&Session> {
        self.by_cid.get(&cid).and_then(|addr| self.sessions.get(addr))
    }

    pub fn by_handle(&self, handle: u16) -> Option<&Session> {
        self.by_handle.get(&handle).and_then(|addr| self.sessions.get(addr))
    }

    pub fn addr_for_cid(&self, cid: u16) -> Option<DeviceAddress> {
        self.by_cid.get(&cid).copied()
    }

    pub fn addr_for_handle(&self, handle: u16) -> Option<DeviceAddress> {
        self.by_handle.get(&handle).copied()
    }

    /// Register `cid` as an auxiliary key for `addr`'s session. Non-zero
    /// `rfcomm_cid` values must be unique across live sessions (§3 invariant).
    pub fn index_cid(&mut self, cid: u16, addr: DeviceAddress) {
        if cid != 0 {
            self.by_cid.insert(cid, addr);
        }
    }

    /// Register `handle` as an auxiliary key for `addr`'s session.
    pub fn index_handle(&mut self, handle: u16, addr: DeviceAddress) {
        if handle != 0 {
            self.by_handle.insert(handle, addr);
        }
    }

    /// Remove a session and every auxiliary index pointing at it (lifecycle
    /// terminal state reached).
    pub fn remove(&mut self, addr: DeviceAddress) -> Option<Session> {
        let session = self.sessions.remove(&addr)?;
        if session.rfcomm_cid != 0 {
            self.by_cid.remove(&session.rfcomm_cid);
        }
        if session.con_handle != 0 {
            self.by_handle.remove(&session.con_handle);
        }
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> DeviceAddress {
        DeviceAddress::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn provide_is_idempotent() {
        let mut reg = Registry::new();
        reg.provide(addr(1)).remote_supported_features = 7;
        assert_eq!(reg.provide(addr(1)).remote_supported_features, 7);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn looks_up_by_cid_and_handle() {
        let mut reg = Registry::new();
        reg.provide(addr(1));
        reg.index_cid(5, addr(1));
        reg.index_handle(9, addr(1));
        assert_eq!(reg.by_cid(5).unwrap().remote_addr, addr(1));
        assert_eq!(reg.by_handle(9).unwrap().remote_addr, addr(1));
    }

    #[test]
    fn remove_clears_auxiliary_indexes() {
        let mut reg = Registry::new();
        let s = reg.provide(addr(1));
        s.rfcomm_cid = 5;
        s.con_handle = 9;
        reg.index_cid(5, addr(1));
        reg.index_handle(9, addr(1));
        reg.remove(addr(1));
        assert!(reg.by_cid(5).is_none());
        assert!(reg.by_handle(9).is_none());
        assert!(reg.is_empty());
    }
}
