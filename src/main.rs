use bluing_le::domain::settings::SettingsService;
use bluing_le::infrastructure::logging::init_logger;
use bluing_le::infrastructure::sniffer::AdvSniffer;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get();

    let _logging_guard = init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting bluing-le advertising sniffer");

    let sniffer = AdvSniffer::new(settings.sniffer.clone());
    let devices = sniffer.device_paths()?;
    if devices.is_empty() {
        anyhow::bail!("No capture peripheral found; plug in a micro:bit or set sniffer.device_paths");
    }

    let mut session = sniffer.start(&devices)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            pdu = session.recv() => match pdu {
                Some(pdu) => {
                    let adv_a = pdu
                        .adv_a()
                        .map(|a| format!("{} ({})", a.bd_addr, a.kind))
                        .unwrap_or_else(|| "-".to_string());
                    let ad_structs = pdu.ad_structs();
                    info!(
                        channel = %pdu.channel,
                        "{} AdvA {} {} address(es), {} AD structure(s)",
                        pdu.kind,
                        adv_a,
                        pdu.addresses.len(),
                        ad_structs.len()
                    );
                    for company in ad_structs.iter().filter_map(|ad| ad.company_name()) {
                        debug!(channel = %pdu.channel, "manufacturer data from {}", company);
                    }
                }
                None => {
                    warn!("All capture peripherals stopped");
                    break;
                }
            },
        }
    }

    session.stop().await;
    Ok(())
}
