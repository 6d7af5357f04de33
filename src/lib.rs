//! # The ECU Flash Crate
//! Welcome to the `ecuflash` crate documentation. This crate decides, sequences and audits every operation that can
//! permanently alter an engine control unit's firmware. Transports (CAN, ISO-TP, UDS, KWP2000, J2534) stay outside;
//! they are reached through the [`session::EcuMemory`] trait.
//!
//! ## Flash Session Example
//!
//! A session is created for a firmware image, started by an attributed and confirmed operator, fed with write
//! bursts, completed, and finally verified against the image's SHA-256.
//!
//! ```rust
//! use std::sync::Arc;
//! use ecuflash::audit::MemoryAuditSink;
//! use ecuflash::checksum::{self, ChecksumAlgorithm};
//! use ecuflash::gate::OperatorContext;
//! use ecuflash::policy::{OperatorMode, OperatorModePolicy};
//! use ecuflash::session::*;
//!
//! async fn flash_example() -> ecuflash::Result<()> {
//!     let (policy, _controller) = OperatorModePolicy::new(OperatorMode::Workshop);
//!     let manager = FlashManager::new(policy, Arc::new(MemoryAuditSink::new()));
//!     manager.register_ecu("ecm", Arc::new(MemoryEcu::new(0x8000).attested("j2534"))).await;
//!
//!     let image = vec![0x5a; 0x1000];
//!     let hash = checksum::compute(&image, ChecksumAlgorithm::Sha256).to_hex();
//!     let request = CreateSessionRequest::new("ecm", "stage1.bin", hash).with_image_size(image.len() as u64);
//!     let session = manager.create_session(request).await?;
//!
//!     let operator = OperatorContext::technician("tech-42").with_job("job-7").confirmed();
//!     manager.start(&session.id, &operator).await?;
//!     manager
//!         .write_rom(&session.id, WriteRomRequest { start_address: 0, data: image, verify: true }, &operator)
//!         .await?;
//!     manager
//!         .update_progress(&session.id, ProgressUpdate::new(100).with_status(FlashStatus::Completed))
//!         .await?;
//!
//!     let session = manager.verify(&session.id).await?;
//!     assert_eq!(session.checksum_validated, Some(true));
//!     Ok(())
//! }
//! ```
//!
//! ## Operator modes
//!  - `dev`: no ECU writes at all
//!  - `workshop`: writes need real hardware, explicit confirmation and a technician
//!  - `lab`: writes need confirmation only
//!

pub mod audit;
pub mod checksum;
mod error;
pub mod gate;
pub mod policy;
pub mod session;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
