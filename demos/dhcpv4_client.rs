// SPDX-License-Identifier: Apache-2.0

use dhcpv4_client::{DhcpV4Client, DhcpV4Config, DhcpV4Notification};

const TEST_NIC: &str = "dhcpcli";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_log();
    let mut config = DhcpV4Config::new(TEST_NIC);
    config.set_host_name("dhcpv4-client-test");
    let (client, handle, mut notifications) =
        DhcpV4Client::new(config).await?;
    let client_task = tokio::spawn(client.run());

    handle.start()?;
    while let Some(notification) = notifications.recv().await {
        match notification {
            DhcpV4Notification::ConfigureAddress {
                addr,
                prefix_length,
            } => {
                // You need to code to apply the IP address to this NIC, so
                // follow up renew can work.
                println!("Please configure {addr}/{prefix_length}");
                handle.address_configured()?;
                handle.quit()?;
            }
            DhcpV4Notification::Success(lease) => {
                println!("Got lease {lease:?}");
            }
            DhcpV4Notification::Terminated => break,
            n => println!("{n:?}"),
        }
    }
    client_task.await?;
    Ok(())
}

fn enable_log() {
    env_logger::Builder::new()
        .filter(Some("dhcpv4_client"), log::LevelFilter::Debug)
        .init();
}
