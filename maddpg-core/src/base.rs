//! Core types shared by replay buffers and agents.
mod history;
mod replay_buffer;
mod space;
mod transition;
pub use history::ObsHistory;
pub use replay_buffer::ExperienceBufferBase;
pub use space::ActionSpace;
pub use transition::Transition;
