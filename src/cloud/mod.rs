// src/cloud/mod.rs - Cloud-facing pieces: wire codec, transport seam, gateway
pub mod codec;
pub mod gateway;
pub mod transport;
