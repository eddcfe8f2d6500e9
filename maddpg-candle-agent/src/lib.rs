//! Recurrent MADDPG agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! Each [`Maddpg`](maddpg::Maddpg) agent owns a history replay buffer, a
//! decentralized actor and a centralized critic together with their target
//! networks. A round of training is driven by [`update_all`](maddpg::update_all).
pub mod maddpg;
pub mod model;
pub mod opt;
pub mod recurrent;
pub mod util;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    #[default]
    Cpu,

    /// The GPU device with the given ordinal.
    Cuda(usize),
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
