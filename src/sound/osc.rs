// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! OSC/UDP 传输: 每个事件一条不可靠、无序、无应答的 UDP 报文

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rosc::{encoder, OscMessage, OscPacket, OscType};
use tracing::debug;

use crate::error::DispatchError;

/// 出站消息通道 (发送线程与测试替身共享同一接口)
pub trait MessageSink: Send + Sync {
    /// 发送一条消息: 地址路径 + 单个字符串参数
    fn send(&self, path: &str, arg: &str) -> Result<(), DispatchError>;
}

/// 编码一条 OSC 消息
pub fn encode_message(path: &str, arg: &str) -> Result<Vec<u8>, DispatchError> {
    let packet = OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args: vec![OscType::String(arg.to_string())],
    });
    encoder::encode(&packet).map_err(|e| DispatchError::Encode {
        addr: path.to_string(),
        reason: e.to_string(),
    })
}

/// SuperCollider 等音频引擎的 UDP 客户端
pub struct UdpOscSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpOscSink {
    pub fn connect(host: &str, port: u16) -> Result<Self, DispatchError> {
        let target = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            DispatchError::Transport(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("cannot resolve {}:{}", host, port),
            ))
        })?;
        let bind = if target.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let socket = UdpSocket::bind(bind)?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl MessageSink for UdpOscSink {
    fn send(&self, path: &str, arg: &str) -> Result<(), DispatchError> {
        let bytes = encode_message(path, arg)?;
        self.socket.send_to(&bytes, self.target)?;
        debug!("OSC {} {:?} → {}", path, arg, self.target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_udp_sink_wire_format() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let sink = UdpOscSink::connect("127.0.0.1", port).unwrap();
        sink.send("/class", "rain").unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..n]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/class");
                assert_eq!(msg.args, vec![OscType::String("rain".to_string())]);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_encode_is_padded_to_four_bytes() {
        let bytes = encode_message("/stop", "city").unwrap();
        assert_eq!(bytes.len() % 4, 0);
    }
}
