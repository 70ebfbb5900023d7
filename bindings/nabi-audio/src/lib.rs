//!
//! nabi-audio - Bindings for the audio engine's C API
//!
//! Everything here is generated from `surfaces/audio_engine.toml`:
//! - handles: `System`, `Sound`, `Channel`, `ChannelGroup`, `Geometry`
//! - `#[repr(C)]` structs: `Vector`, `CpuUsage`, `AsyncReadInfo`, `CreateSoundInfo`
//! - `AudioEngine`, one forwarder per engine function
//! - `SystemGuard`, `SoundGuard`, `GeometryGuard` release on drop
//!
//! ```rust,ignore
//! let engine = AudioEngine::open_default()?;
//! let mut system = System::NULL;
//! unsafe { engine.system_create(&mut system) };
//! let system = unsafe { SystemGuard::new(&engine, system) };
//! ```
//!
//! Functions missing from older engine builds (`System_GetCPUUsageEx`,
//! `Channel_SetLowPassGain`, `Channel_IsVirtual`) return
//! `Err(MissingEntryPoint)` instead of failing the load.
//!

include!(concat!(env!("OUT_DIR"), "/audio_engine.rs"));

/// Status code the engine returns on success.
pub const OK: i32 = 0;
