//! Minimal MQTT 3.1.1 broker for exercising the client loops over real TCP.

use std::io;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::config::BrokerConfig;

pub const CONNECT: u8 = 1;
pub const PUBLISH: u8 = 3;
pub const SUBSCRIBE: u8 = 8;
pub const DISCONNECT: u8 = 14;

pub struct FakeBroker {
    listener: TcpListener,
}

impl FakeBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn config(&self) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: self.listener.local_addr().unwrap().port(),
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }

    /// Accepts the next client and answers its CONNECT.
    pub async fn accept(&self) -> BrokerConnection {
        let (stream, _) = self.listener.accept().await.unwrap();
        let mut connection = BrokerConnection { stream };

        let (kind, _) = connection.read_packet().await.unwrap().unwrap();
        assert_eq!(kind, CONNECT);
        connection.write(&[0x20, 0x02, 0x00, 0x00]).await;

        connection
    }
}

pub struct BrokerConnection {
    stream: TcpStream,
}

impl BrokerConnection {
    /// Next packet as (type, body); `None` once the client hangs up.
    pub async fn read_packet(&mut self) -> io::Result<Option<(u8, Vec<u8>)>> {
        let header = match self.stream.read_u8().await {
            Ok(header) => header,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = self.stream.read_u8().await?;
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0; len];
        self.stream.read_exact(&mut body).await?;

        Ok(Some((header >> 4, body)))
    }

    /// Waits for a SUBSCRIBE, grants it and returns the topic filter.
    pub async fn accept_subscribe(&mut self) -> String {
        let body = loop {
            let (kind, body) = self.read_packet().await.unwrap().unwrap();
            if kind == SUBSCRIBE {
                break body;
            }
        };

        let topic_len = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let topic = String::from_utf8(body[4..4 + topic_len].to_vec()).unwrap();
        self.write(&[0x90, 0x03, body[0], body[1], 0x00]).await;

        topic
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) {
        let mut body = (topic.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);

        let mut packet = vec![0x30];
        let mut len = body.len();
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if len == 0 {
                break;
            }
        }
        packet.extend(body);

        self.write(&packet).await;
    }

    async fn write(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}

/// Topic of a PUBLISH body.
pub fn publish_topic(body: &[u8]) -> &str {
    let len = usize::from(u16::from_be_bytes([body[0], body[1]]));
    std::str::from_utf8(&body[2..2 + len]).unwrap()
}
