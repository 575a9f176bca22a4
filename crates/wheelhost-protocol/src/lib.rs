//! Wire protocol between the phone and the host.
//!
//! One UDP datagram carries one UTF-8 JSON object in either direction. The
//! phone sends telemetry packets signed `"WHEEL1"` plus a small set of
//! control messages; the host answers with a compact single-line feedback
//! reply. Parsing is tolerant (numbers may arrive as strings, booleans in a
//! handful of spellings) because the fleet of phone app builds in the wild
//! is not uniform.

#![deny(static_mut_refs)]

mod codec;
mod packet;
mod reply;

pub use codec::{Decoded, IgnoreReason, ProtocolCodec, SIGNATURE};
pub use packet::{InputPacket, PacketMeta};
pub use reply::{encode_packet, encode_reply};
