//! Manual test sender: drives a running event server through a short
//! scripted exchange (hello, a queued button, a held button, the pointer,
//! then goodbye).

use clap::Parser;
use shared::{ActionKind, Packet, PacketBody};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:9777")]
    server: SocketAddr,

    /// Session token to embed (0 = let the server key on our address)
    #[clap(short, long, default_value = "0")]
    token: u32,

    /// Device name sent in the hello packet
    #[clap(short, long, default_value = "test-client")]
    device: String,
}

async fn send(socket: &UdpSocket, target: SocketAddr, token: u32, body: PacketBody) {
    match Packet::new(token, body).encode() {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, target).await {
                eprintln!("Send failed: {}", e);
            }
        }
        Err(e) => eprintln!("Encode failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Hello {
            device_name: args.device.clone(),
        },
    )
    .await;
    sleep(Duration::from_millis(100)).await;

    // A queued button: press then release, dispatched once by name.
    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Button {
            map_name: "KB".to_string(),
            button_name: "select".to_string(),
            code: 0x0d,
            down: true,
            queue: true,
            amount: 1.0,
            axis: false,
            joystick: false,
        },
    )
    .await;
    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Button {
            map_name: "KB".to_string(),
            button_name: "select".to_string(),
            code: 0x0d,
            down: false,
            queue: true,
            amount: 0.0,
            axis: false,
            joystick: false,
        },
    )
    .await;
    sleep(Duration::from_millis(100)).await;

    // A held button for the polling query surface.
    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Button {
            map_name: "KB".to_string(),
            button_name: "down".to_string(),
            code: 0x28,
            down: true,
            queue: false,
            amount: 1.0,
            axis: false,
            joystick: false,
        },
    )
    .await;
    sleep(Duration::from_millis(500)).await;
    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Button {
            map_name: "KB".to_string(),
            button_name: "down".to_string(),
            code: 0x28,
            down: false,
            queue: false,
            amount: 0.0,
            axis: false,
            joystick: false,
        },
    )
    .await;

    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Mouse { x: 0.5, y: 0.5 },
    )
    .await;

    send(
        &socket,
        args.server,
        args.token,
        PacketBody::Action {
            kind: ActionKind::ExecBuiltin,
            text: "Notification(hello from test client)".to_string(),
        },
    )
    .await;
    sleep(Duration::from_millis(200)).await;

    send(&socket, args.server, args.token, PacketBody::Ping).await;
    sleep(Duration::from_millis(200)).await;

    send(&socket, args.server, args.token, PacketBody::Bye).await;
    println!("Done");

    Ok(())
}
