use super::ChannelError;

/// A rendezvous server address: the HTTP host plus, usually, one
/// store-and-forward channel name under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousAddress {
    pub host: String,
    pub channel: Option<String>,
}

/// Splits a rendezvous url of the form `http(s)://HOST[/channel/<id>]` at
/// the *rightmost* `/channel/` delimiter. A url without the suffix is
/// valid and names only the host.
pub fn parse_rendezvous_url(url: &str) -> Result<RendezvousAddress, ChannelError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ChannelError::InvalidUrl(url.to_owned()));
    }
    match url.rfind("/channel/") {
        Some(position) => {
            let channel = &url[position + "/channel/".len()..];
            if channel.is_empty() {
                return Err(ChannelError::InvalidUrl(url.to_owned()));
            }
            Ok(RendezvousAddress {
                host: url[..position].to_owned(),
                channel: Some(channel.to_owned()),
            })
        }
        None => Ok(RendezvousAddress {
            host: url.to_owned(),
            channel: None,
        }),
    }
}

/// A Bluetooth RFCOMM address: twelve hex digits of device address and a
/// channel number. Port 0 stands for "unspecified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothAddress {
    pub address: String,
    pub port: u8,
}

/// Parses `btspp://<12-hex-mac>[:<2-hex-port>]`. The port is hex and
/// optional, but a trailing colon without one is malformed, as is any
/// address that is not exactly twelve hex digits.
pub fn parse_bluetooth_url(url: &str) -> Result<BluetoothAddress, ChannelError> {
    let malformed = || ChannelError::InvalidUrl(url.to_owned());

    let rest = url.strip_prefix("btspp://").ok_or_else(malformed)?;
    let (address, port) = match rest.split_once(':') {
        Some((address, port)) => {
            if port.is_empty() || port.len() > 2 {
                return Err(malformed());
            }
            (address, u8::from_str_radix(port, 16).map_err(|_| malformed())?)
        }
        None => (rest, 0),
    };

    if address.len() != 12 || !address.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }

    Ok(BluetoothAddress {
        address: address.to_owned(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bluetooth_with_port() {
        let parsed = parse_bluetooth_url("btspp://a5c32c6100e7:23").unwrap();
        assert_eq!(parsed.address, "a5c32c6100e7");
        assert_eq!(parsed.port, 0x23);
    }

    #[test]
    fn bluetooth_without_port() {
        let parsed = parse_bluetooth_url("btspp://a5c32c6100e7").unwrap();
        assert_eq!(parsed.address, "a5c32c6100e7");
        assert_eq!(parsed.port, 0);
    }

    #[test]
    fn bluetooth_malformed_inputs() {
        // odd-length address
        assert!(parse_bluetooth_url("btspp://5c32c6100e7:23").is_err());
        // trailing colon without a port
        assert!(parse_bluetooth_url("btspp://a5c32c6100e7:").is_err());
        // wrong scheme
        assert!(parse_bluetooth_url("btsppx://a5c32c6100e7:23").is_err());
        assert!(parse_bluetooth_url("http://a5c32c6100e7").is_err());
        // non-hex address
        assert!(parse_bluetooth_url("btspp://a5c32c6100zz").is_err());
        // over-long port
        assert!(parse_bluetooth_url("btspp://a5c32c6100e7:123").is_err());
    }

    #[test]
    fn rendezvous_with_channel() {
        let parsed =
            parse_rendezvous_url("http://rendezvous.mypico.org/channel/0123456789abcdef").unwrap();
        assert_eq!(parsed.host, "http://rendezvous.mypico.org");
        assert_eq!(parsed.channel.as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn rendezvous_splits_at_the_rightmost_delimiter() {
        let parsed =
            parse_rendezvous_url("https://host/channel/outer/channel/inner").unwrap();
        assert_eq!(parsed.host, "https://host/channel/outer");
        assert_eq!(parsed.channel.as_deref(), Some("inner"));
    }

    #[test]
    fn rendezvous_host_only() {
        let parsed = parse_rendezvous_url("https://rendezvous.mypico.org").unwrap();
        assert_eq!(parsed.host, "https://rendezvous.mypico.org");
        assert_eq!(parsed.channel, None);
    }

    #[test]
    fn rendezvous_malformed_inputs() {
        assert!(parse_rendezvous_url("ftp://host/channel/abc").is_err());
        assert!(parse_rendezvous_url("http://host/channel/").is_err());
    }
}
