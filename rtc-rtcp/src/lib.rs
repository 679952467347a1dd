#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod header;
pub mod packet;
pub mod reception_report;
pub mod sender_report;
pub mod transport_feedbacks;

pub use header::{Header, PacketType};
pub use packet::Packet;
pub use reception_report::ReceptionReport;
pub use sender_report::SenderReport;
