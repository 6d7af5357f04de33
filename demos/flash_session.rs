use std::sync::Arc;

use ecuflash::audit::TracingAuditSink;
use ecuflash::checksum::{self, ChecksumAlgorithm};
use ecuflash::gate::OperatorContext;
use ecuflash::policy::{OperatorModePolicy, PolicyConfig};
use ecuflash::session::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Run with ECU_OPERATOR_MODE=lab or ECU_OPERATOR_MODE=workshop to allow the flash
    let (policy, _controller) = OperatorModePolicy::from_config(&PolicyConfig::from_env());
    let manager = FlashManager::new(policy, Arc::new(TracingAuditSink));
    manager
        .register_ecu("ecm", Arc::new(MemoryEcu::new(0x10000).attested("bench")))
        .await;

    let image: Vec<u8> = (0..0x2000u32).map(|i| (i % 256) as u8).collect();
    let hash = checksum::compute(&image, ChecksumAlgorithm::Sha256).to_hex();
    let request = CreateSessionRequest::new("ecm", "stage1.bin", hash).with_image_size(image.len() as u64);
    let session = manager.create_session(request).await.unwrap();

    let operator = OperatorContext::technician("tech-42").with_job("job-7").confirmed();
    if let Err(e) = manager.start(&session.id, &operator).await {
        println!("Flash refused in {} mode: {}", manager.current_mode(), e);
        return;
    }

    for (i, chunk) in image.chunks(0x800).enumerate() {
        let request = WriteRomRequest {
            start_address: i * 0x800,
            data: chunk.to_vec(),
            verify: true,
        };
        let outcome = manager.write_rom(&session.id, request, &operator).await.unwrap();
        println!("Wrote block {} ({}%)", i, outcome.session.progress);
    }

    manager
        .update_progress(&session.id, ProgressUpdate::new(100).with_status(FlashStatus::Completed))
        .await
        .unwrap();
    let session = manager.verify(&session.id).await.unwrap();
    println!("Verified: {:?}", session.checksum_validated);

    let report = manager
        .calculate_checksum(&session.id, 0, image.len(), ChecksumAlgorithm::Crc32)
        .await
        .unwrap();
    println!("CRC-32 of image region: {}", report.value);
}
