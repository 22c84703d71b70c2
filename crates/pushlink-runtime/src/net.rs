//! Socket helpers shared by both listeners

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use pushlink_core::BindError;
use tokio::net::TcpListener;

/// Bind a TCP listener, classifying failures for the operator
pub async fn bind_tcp(address: SocketAddr) -> Result<(TcpListener, SocketAddr), BindError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| BindError::from_io(address.to_string(), e))?;
    let local = listener
        .local_addr()
        .map_err(|e| BindError::from_io(address.to_string(), e))?;
    Ok((listener, local))
}

/// Address a phone on the LAN should dial.
///
/// A wildcard bind says nothing useful, so ask the routing table which
/// interface would reach the outside world. No packet is sent.
pub fn advertised_ip(bind: IpAddr) -> IpAddr {
    if !bind.is_unspecified() {
        return bind;
    }
    outbound_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
