// NOTE: env vars set in one test are visible to every other test running at the same
// time. Each test uses its own prefix.

use std::{net::Ipv4Addr, path::Path, time::Duration};

use clap::Parser as _;
use figment::Jail;
use secrecy::ExposeSecret as _;

use crate::{
    config::{
        ConnectTimeoutPolicy, DnsPolicy, InvalidDialConfig, IpVersion, OperatorSelector,
    },
    settings::{Args, Settings},
};

const CFG_FILE_CONTENTS: &str = r#"
    at_port = "/config/ttyUSB2"
    ppp_port = "/config/ttyUSB3"
    baud = 115200
    apn = "config.apn"
    pin = "0042"
    operator = "26201"
    ip_version = "ipv4v6"
    use_peer_dns = false
    dns_primary = "9.9.9.9"
    interface = "ppp7"
    script_dir = "/config/scripts"
    connect_timeout = 30000
    connect_timeout_policy = "exit"
    sudo_password = "from-config"
"#;

fn make_args(args: &str) -> Result<Args, clap::Error> {
    Args::try_parse_from(str::split_ascii_whitespace(args))
}

#[test]
fn defaults_without_any_source() {
    Jail::expect_with(|_jail| {
        let args = make_args("wwan-connd").unwrap();
        let settings = Settings::get(&args, "missing.toml", "wwan_defaults_")?;

        assert_eq!(settings.at_port, Path::new("/dev/ttyUSB2"));
        assert_eq!(settings.ppp_port, Path::new("/dev/ttyUSB3"));
        assert_eq!(settings.baud, 460_800);
        assert_eq!(settings.apn, "internet");
        assert_eq!(settings.pin, "");
        assert_eq!(settings.operator, OperatorSelector::Auto);
        assert_eq!(settings.ip_version, IpVersion::IPv4);
        assert!(settings.use_peer_dns);
        assert_eq!(settings.interface, "ppp0");
        assert_eq!(settings.script_dir, Path::new("/tmp"));
        assert_eq!(settings.connect_timeout, Duration::from_secs(60));
        assert_eq!(settings.connect_timeout_policy, ConnectTimeoutPolicy::Abort);
        assert!(settings.sudo_password.is_none());

        Ok(())
    });
}

#[test]
fn config_file_is_read() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS)?;
        let args = make_args("wwan-connd").unwrap();

        let settings = Settings::get(&args, "config.toml", "wwan_file_")?;

        assert_eq!(settings.at_port, Path::new("/config/ttyUSB2"));
        assert_eq!(settings.baud, 115_200);
        assert_eq!(settings.pin, "0042");
        assert_eq!(settings.operator, OperatorSelector::Numeric("26201".into()));
        assert_eq!(settings.ip_version, IpVersion::IPv4v6);
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
        assert_eq!(settings.connect_timeout_policy, ConnectTimeoutPolicy::Exit);
        assert_eq!(
            settings.sudo_password.as_ref().unwrap().expose_secret(),
            "from-config"
        );

        let dial = settings.dial_config().unwrap();
        assert_eq!(
            dial.dns,
            DnsPolicy::Explicit {
                primary: Ipv4Addr::new(9, 9, 9, 9),
                secondary: DnsPolicy::DEFAULT_SECONDARY,
            }
        );
        assert_eq!(dial.interface, "ppp7");
        assert_eq!(settings.timings().attempt_budget, Duration::from_secs(30));

        Ok(())
    });
}

#[test]
fn env_vars_override_config_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS)?;
        jail.set_env("wwan_env_at_port", "/env/ttyACM0");
        jail.set_env("wwan_env_pin", "1234");
        jail.set_env("wwan_env_operator", "0");
        jail.set_env("wwan_env_use_peer_dns", "true");
        jail.set_env("wwan_env_connect_timeout", "45000");
        jail.set_env("wwan_env_sudo_password", "4321");
        let args = make_args("wwan-connd").unwrap();

        let settings = Settings::get(&args, "config.toml", "wwan_env_")?;

        assert_eq!(settings.at_port, Path::new("/env/ttyACM0"));
        assert_eq!(settings.ppp_port, Path::new("/config/ttyUSB3"));
        assert_eq!(settings.pin, "1234");
        assert_eq!(settings.operator, OperatorSelector::Auto);
        assert_eq!(settings.dial_config().unwrap().dns, DnsPolicy::Peer);
        assert_eq!(settings.connect_timeout, Duration::from_secs(45));
        assert_eq!(
            settings.sudo_password.as_ref().unwrap().expose_secret(),
            "4321"
        );

        Ok(())
    });
}

#[test]
fn cli_args_override_config_file_and_env_vars() {
    const CLI_ARGS: &str = r#"
    wwan-connd
        --at-port /args/ttyUSB0
        --ppp-port /args/ttyUSB1
        --baud 921600
        --apn args.apn
        --operator 310260
        --ip-version ipv6
        --peer-dns false
        --dns-secondary 8.8.4.4
        --interface ppp9
        --script-dir /args/scripts
        --connect-timeout 90000
        --connect-timeout-policy abort
    "#;

    Jail::expect_with(|jail| {
        jail.create_file("config.toml", CFG_FILE_CONTENTS)?;
        jail.set_env("wwan_cli_at_port", "/env/ttyACM0");
        jail.set_env("wwan_cli_apn", "env.apn");
        jail.set_env("wwan_cli_use_peer_dns", "true");
        let args = make_args(CLI_ARGS).unwrap();

        let settings = Settings::get(&args, "config.toml", "wwan_cli_")?;

        assert_eq!(settings.at_port, Path::new("/args/ttyUSB0"));
        assert_eq!(settings.ppp_port, Path::new("/args/ttyUSB1"));
        assert_eq!(settings.baud, 921_600);
        assert_eq!(settings.apn, "args.apn");
        assert_eq!(settings.operator, OperatorSelector::Numeric("310260".into()));
        assert_eq!(settings.ip_version, IpVersion::IPv6);
        assert_eq!(settings.interface, "ppp9");
        assert_eq!(settings.script_dir, Path::new("/args/scripts"));
        assert_eq!(settings.connect_timeout, Duration::from_secs(90));
        assert_eq!(settings.connect_timeout_policy, ConnectTimeoutPolicy::Abort);
        assert_eq!(
            settings.dial_config().unwrap().dns,
            DnsPolicy::Explicit {
                primary: Ipv4Addr::new(9, 9, 9, 9),
                secondary: Ipv4Addr::new(8, 8, 4, 4),
            }
        );
        // secrets never come from the command line
        assert_eq!(settings.pin, "0042");

        Ok(())
    });
}

#[test]
fn secrets_are_not_command_line_options() {
    assert!(make_args("wwan-connd --pin 1234").is_err());
    assert!(make_args("wwan-connd --sudo-password hunter2").is_err());
}

#[test]
fn unknown_ip_version_is_an_error() {
    Jail::expect_with(|jail| {
        jail.set_env("wwan_badip_ip_version", "ipx");
        let args = make_args("wwan-connd").unwrap();

        assert!(Settings::get(&args, "missing.toml", "wwan_badip_").is_err());

        Ok(())
    });
}

#[test]
fn apn_that_would_break_the_chat_script_is_rejected() {
    Jail::expect_with(|jail| {
        jail.set_env("wwan_badapn_apn", r#"internet" ABORT "OK"#);
        let args = make_args("wwan-connd").unwrap();

        let settings = Settings::get(&args, "missing.toml", "wwan_badapn_")?;

        assert!(matches!(
            settings.dial_config(),
            Err(InvalidDialConfig::Unquotable { field: "apn" })
        ));

        Ok(())
    });
}
