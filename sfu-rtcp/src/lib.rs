#![warn(rust_2018_idioms)]

pub mod compound;
pub mod goodbye;
pub mod header;
pub mod packet;
pub mod payload_feedbacks;
pub mod receiver_report;
pub mod reception_report;
pub mod sender_report;
pub mod source_description;
pub mod transport_feedbacks;

pub use header::Header;
pub use packet::Packet;
