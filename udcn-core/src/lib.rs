pub mod name;
pub mod packets;
pub mod tlv;

pub use name::{Component, Name, NameError};
pub use packets::{Data, DataSatisfyResult, Interest, LpHeader, Nack, Packet, PacketError, L3};
pub use tlv::{TlvElement, TlvError};
