use super::{Modem, ModemChannel, ModemError, ModemInfo, OperatorEntry, SignalSample};
use async_trait::async_trait;
use flume::Sender;
use std::thread;
use tokio::sync::oneshot;
use tracing::info;

/// Cloneable handle to the thread owning the [`ModemChannel`].
///
/// Requests queue up on the worker, so the AT port is never touched from two places
/// at once. The worker exits once every handle is dropped.
#[derive(Clone)]
pub struct ModemHandle {
    tx: Sender<Msg>,
}

impl ModemHandle {
    pub fn spawn(mut channel: ModemChannel) -> Self {
        let (tx, rx) = flume::unbounded();

        thread::spawn(move || {
            info!("modem worker started for {}", channel.path().display());

            while let Ok(msg) = rx.recv() {
                match msg {
                    Msg::Open { reply } => {
                        let _ = reply.send(channel.open());
                    }

                    Msg::SignalStrength { reply } => {
                        let _ = reply.send(channel.signal_strength());
                    }

                    Msg::UpdateOperatorName { reply } => {
                        let _ = reply.send(channel.update_operator_name());
                    }

                    Msg::OperatorName { reply } => {
                        let _ = reply.send(channel.operator_name().to_owned());
                    }

                    Msg::Reset { reply } => {
                        let _ = reply.send(channel.reset());
                    }

                    Msg::Probe { reply } => {
                        let _ = reply.send(channel.probe());
                    }

                    Msg::ModemInfo { reply } => {
                        let _ = reply.send(channel.modem_info());
                    }

                    Msg::ScanOperators { reply } => {
                        let _ = reply.send(channel.scan_operators());
                    }
                }
            }

            channel.close();
            info!("modem worker stopped");
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        msg: impl FnOnce(oneshot::Sender<T>) -> Msg,
    ) -> Result<T, ModemError> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send_async(msg(reply))
            .await
            .map_err(|_| ModemError::WorkerGone)?;

        rx.await.map_err(|_| ModemError::WorkerGone)
    }
}

#[async_trait]
impl Modem for ModemHandle {
    async fn open(&self) -> Result<(), ModemError> {
        self.request(|reply| Msg::Open { reply }).await?
    }

    async fn signal_strength(&self) -> Option<SignalSample> {
        self.request(|reply| Msg::SignalStrength { reply })
            .await
            .ok()
            .flatten()
    }

    async fn update_operator_name(&self) -> String {
        self.request(|reply| Msg::UpdateOperatorName { reply })
            .await
            .unwrap_or_default()
    }

    async fn operator_name(&self) -> String {
        self.request(|reply| Msg::OperatorName { reply })
            .await
            .unwrap_or_default()
    }

    async fn reset(&self) -> Result<(), ModemError> {
        self.request(|reply| Msg::Reset { reply }).await?
    }

    async fn probe(&self) -> Result<(), ModemError> {
        self.request(|reply| Msg::Probe { reply }).await?
    }

    async fn modem_info(&self) -> ModemInfo {
        self.request(|reply| Msg::ModemInfo { reply })
            .await
            .unwrap_or_default()
    }

    async fn scan_operators(&self) -> Result<Vec<OperatorEntry>, ModemError> {
        self.request(|reply| Msg::ScanOperators { reply }).await?
    }
}

enum Msg {
    Open {
        reply: oneshot::Sender<Result<(), ModemError>>,
    },

    SignalStrength {
        reply: oneshot::Sender<Option<SignalSample>>,
    },

    UpdateOperatorName {
        reply: oneshot::Sender<String>,
    },

    OperatorName {
        reply: oneshot::Sender<String>,
    },

    Reset {
        reply: oneshot::Sender<Result<(), ModemError>>,
    },

    Probe {
        reply: oneshot::Sender<Result<(), ModemError>>,
    },

    ModemInfo {
        reply: oneshot::Sender<ModemInfo>,
    },

    ScanOperators {
        reply: oneshot::Sender<Result<Vec<OperatorEntry>, ModemError>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::{SignalLevel, fake::FakeAtPort};

    #[tokio::test]
    async fn requests_are_served_in_order() {
        let port = FakeAtPort::answering(&[
            "+CSQ: 12,99\r\nOK\r\n",
            "+COPS: 0,0,\"Orange\",7\r\nOK\r\n",
        ]);
        let modem = ModemHandle::spawn(ModemChannel::new("/dev/ttyUSB2", port.clone()));

        let sample = modem.signal_strength().await.unwrap();
        assert_eq!(sample.level, SignalLevel::Fair);

        assert_eq!(modem.update_operator_name().await, "Orange");
        assert_eq!(modem.clone().operator_name().await, "Orange");

        modem.reset().await.unwrap();
        assert_eq!(port.written(), vec!["AT+CSQ", "AT+COPS?", "AT+CFUN=1,1"]);
    }
}
