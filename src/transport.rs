//! External collaborators (§6): RFCOMM, SDP, and HCI are out of scope for
//! this core, so they are modeled as narrow traits. Production code wires
//! these to a real Bluetooth stack; the demo binary and the test suite use
//! [`test_support::FakeTransport`].

use crate::address::DeviceAddress;

/// RFCOMM operations the lifecycle FSM issues downward.
pub trait RfcommTransport {
    fn register_service(&mut self, channel_nr: u8, mtu: u16);
    fn create_channel(&mut self, addr: DeviceAddress, channel_nr: u8);
    fn accept(&mut self, cid: u16);
    fn send(&mut self, cid: u16, bytes: &[u8]);
}

/// SDP operations the lifecycle FSM issues downward.
pub trait SdpTransport {
    fn query_rfcomm_channel_for_uuid(&mut self, addr: DeviceAddress, service_uuid: u16);
}

/// HCI operations the lifecycle FSM issues downward.
pub trait HciTransport {
    fn setup_synchronous_connection(&mut self, con_handle: u16);
    fn disconnect(&mut self, handle: u16);
}

pub mod test_support {
    use super::*;

    /// Records every call instead of talking to real hardware. Implements
    /// all three transport traits so a single value can stand in for the
    /// whole downward interface in tests and in the demo binary.
    #[derive(Default)]
    pub struct FakeTransport {
        pub registered_services: Vec<(u8, u16)>,
        pub sdp_queries: Vec<(DeviceAddress, u16)>,
        pub rfcomm_channels_created: Vec<(DeviceAddress, u8)>,
        pub accepted_cids: Vec<u16>,
        pub sent: Vec<(u16, Vec<u8>)>,
        pub synchronous_setups: Vec<u16>,
        pub disconnects: Vec<u16>,
    }

    impl RfcommTransport for FakeTransport {
        fn register_service(&mut self, channel_nr: u8, mtu: u16) {
            self.registered_services.push((channel_nr, mtu));
        }

        fn create_channel(&mut self, addr: DeviceAddress, channel_nr: u8) {
            self.rfcomm_channels_created.push((addr, channel_nr));
        }

        fn accept(&mut self, cid: u16) {
            self.accepted_cids.push(cid);
        }

        fn send(&mut self, cid: u16, bytes: &[u8]) {
            self.sent.push((cid, bytes.to_vec()));
        }
    }

    impl SdpTransport for FakeTransport {
        fn query_rfcomm_channel_for_uuid(&mut self, addr: DeviceAddress, service_uuid: u16) {
            self.sdp_queries.push((addr, service_uuid));
        }
    }

    impl HciTransport for FakeTransport {
        fn setup_synchronous_connection(&mut self, con_handle: u16) {
            self.synchronous_setups.push(con_handle);
        }

        fn disconnect(&mut self, handle: u16) {
            self.disconnects.push(handle);
        }
    }
}
