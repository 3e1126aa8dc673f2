use dbus_launch::BusType;
use fixture::Fixture;
use futures::StreamExt as _;
use std::time::Duration;
use tokio::time;
use wwan_connd::controller::Timings;
use wwan_connd_dbus::{ConnectionState, WwanProxy};


const SIGNAL_WAIT: Duration = Duration::from_secs(5);

async fn launch_bus() -> dbus_launch::Daemon {
    tokio::task::spawn_blocking(|| {
        dbus_launch::Launcher::daemon()
            .bus_type(BusType::Session)
            .launch()
            .expect("failed to launch dbus-daemon")
    })
    .await
    .expect("task panicked")
}

async fn connect(dbusd: &dbus_launch::Daemon) -> zbus::Connection {
    zbus::ConnectionBuilder::address(dbusd.address())
        .unwrap()
        .build()
        .await
        .unwrap()
}

/// Waits until the service answers on the bus.
async fn wait_until_served(proxy: &WwanProxy<'_>) {
    time::timeout(SIGNAL_WAIT, async {
        while proxy.connection_state().await.is_err() {
            time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("service never showed up on the bus");
}

#[tokio::test]
async fn it_signals_state_changes_and_timeouts() {
    // Arrange
    let dbusd = launch_bus().await;
    let fx = Fixture::builder()
        .timings(Timings {
            attempt_period: Duration::from_millis(20),
            attempt_budget: Duration::from_millis(100),
            settle_delay: Duration::ZERO,
            ..Timings::default()
        })
        .run()
        .await;
    let server = fx.service.clone().serve(connect(&dbusd).await);

    let client = connect(&dbusd).await;
    let proxy = WwanProxy::new(&client).await.unwrap();
    wait_until_served(&proxy).await;
    let mut states = proxy.receive_state_changed().await.unwrap();
    let mut timeouts = proxy.receive_connect_timeout().await.unwrap();

    // Act
    proxy.connect().await.unwrap();

    // Assert
    let connecting = time::timeout(SIGNAL_WAIT, states.next())
        .await
        .expect("no StateChanged signal")
        .unwrap();
    assert_eq!(
        *connecting.args().unwrap().state(),
        ConnectionState::Connecting
    );

    time::timeout(SIGNAL_WAIT, timeouts.next())
        .await
        .expect("no ConnectTimeout signal")
        .unwrap();

    let disconnected = time::timeout(SIGNAL_WAIT, states.next())
        .await
        .expect("no StateChanged signal after the timeout")
        .unwrap();
    assert_eq!(
        *disconnected.args().unwrap().state(),
        ConnectionState::Disconnected
    );
    assert_eq!(fx.dialer.terminations(), 1);

    server.abort();
}

#[tokio::test]
async fn it_signals_a_dead_dialer() {
    // Arrange
    let dbusd = launch_bus().await;
    let fx = Fixture::builder()
        .timings(Timings {
            attempt_period: Duration::from_millis(20),
            ..Timings::default()
        })
        .run()
        .await;
    let server = fx.service.clone().serve(connect(&dbusd).await);

    let client = connect(&dbusd).await;
    let proxy = WwanProxy::new(&client).await.unwrap();
    wait_until_served(&proxy).await;
    let mut exits = proxy.receive_dialer_exited().await.unwrap();

    // Act
    proxy.connect().await.unwrap();
    fx.dialer.kill();

    // Assert
    time::timeout(SIGNAL_WAIT, exits.next())
        .await
        .expect("no DialerExited signal")
        .unwrap();
    assert_eq!(
        proxy.connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );

    server.abort();
}
