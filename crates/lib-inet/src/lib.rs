//! Subroutines to manipulate internet addresses in a safely portable way.
//!
//! Both IPv4 and IPv6 addresses are carried in the same fixed-size
//! [`Address`] value, tagged with the address family's octet count. All
//! subnet arithmetic is plain bytewise boolean logic over the address and
//! a netmask of the same length.

use std::{
    fmt::{self, Display},
    net::{Ipv4Addr, Ipv6Addr},
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address length ({0})")]
    InvalidLength(usize),

    #[error("Address/mask length mismatch ({addr} != {mask})")]
    LengthMismatch { addr: usize, mask: usize },

    #[error("Host part does not fit in the unmasked bits")]
    HostOutOfRange,

    #[error("Prefix length {bits} exceeds address width {max}")]
    PrefixTooLong { bits: u32, max: u32 },
}

/// An IPv4 or IPv6 address. `len` is 4 or 16, or 0 for the null address;
/// only the first `len` octets of `buf` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    len: usize,
    buf: [u8; 16],
}

impl Address {
    /// The zero-length null address.
    pub const NULL: Address = Address {
        len: 0,
        buf: [0; 16],
    };

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != 4 && bytes.len() != 16 {
            return Err(AddressError::InvalidLength(bytes.len()));
        }

        let mut buf = [0; 16];
        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            len: bytes.len(),
            buf,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_null(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn check_pair(&self, mask: &Address) -> Result<(), AddressError> {
        if self.len != 4 && self.len != 16 {
            return Err(AddressError::InvalidLength(self.len));
        }
        if self.len != mask.len {
            return Err(AddressError::LengthMismatch {
                addr: self.len,
                mask: mask.len,
            });
        }
        Ok(())
    }

    /// Return just the network number of an internet address.
    pub fn subnet_of(&self, mask: &Address) -> Result<Address, AddressError> {
        self.check_pair(mask)?;

        let mut rv = *self;
        for i in 0..self.len {
            rv.buf[i] = self.buf[i] & mask.buf[i];
        }
        Ok(rv)
    }

    /// Given a subnet number and netmask, return the address on that subnet
    /// for which the host portion of the address is all ones (the standard
    /// broadcast address).
    pub fn broadcast_of(&self, mask: &Address) -> Result<Address, AddressError> {
        self.check_pair(mask)?;

        let mut rv = *self;
        for i in 0..self.len {
            rv.buf[i] = self.buf[i] | !mask.buf[i];
        }
        Ok(rv)
    }

    /// Combine a network number and an integer to produce an internet
    /// address. This won't work for subnets with more than 32 bits of host
    /// address, but maybe this isn't a problem.
    pub fn compose(
        subnet: &Address,
        mask: &Address,
        host_address: u32,
    ) -> Result<Address, AddressError> {
        subnet.check_pair(mask)?;

        let habuf = host_address.to_be_bytes();
        let mut rv = *subnet;
        let j = rv.len - habuf.len();

        // Walk the host part from the least significant octet up. Once a
        // masked octet is reached, the remaining host octets must fit in the
        // complement of the mask or the host number overflows the subnet.
        for i in (0..habuf.len()).rev() {
            if mask.buf[i + j] != 0 {
                if habuf[i] > !mask.buf[i + j] {
                    return Err(AddressError::HostOutOfRange);
                }
                if habuf[..i].iter().any(|&b| b != 0) {
                    return Err(AddressError::HostOutOfRange);
                }
                rv.buf[i + j] |= habuf[i];
                break;
            }
            rv.buf[i + j] = habuf[i];
        }

        Ok(rv)
    }

    /// Return the low 32 bits of the host portion of the address, in host
    /// byte order.
    pub fn host_of(&self, mask: &Address) -> Result<u32, AddressError> {
        self.check_pair(mask)?;

        let mut host = [0u8; 16];
        for i in 0..self.len {
            host[i] = self.buf[i] & !mask.buf[i];
        }

        let mut low = [0u8; 4];
        low.copy_from_slice(&host[self.len - 4..self.len]);
        Ok(u32::from_be_bytes(low))
    }

    /// Compare an address against a network/mask combination by ANDing the
    /// address with the mask and checking the result against the masked
    /// network value.
    pub fn matches(&self, net: &AddressMatch) -> bool {
        if self.len != net.addr.len {
            return false;
        }

        (0..self.len).all(|i| (self.buf[i] & net.mask.buf[i]) == net.addr.buf[i])
    }

    /// Determine the netmask width in bits by counting leading one bits.
    /// An all-ones mask yields the full address width.
    pub fn mask_width(&self) -> Result<u32, AddressError> {
        if self.len != 4 && self.len != 16 {
            return Err(AddressError::InvalidLength(self.len));
        }

        let mut width = 0;
        'scan: for i in 0..self.len {
            for bit in 0..8 {
                if self.buf[i] & (0x80 >> bit) == 0 {
                    break 'scan;
                }
                width += 1;
            }
        }
        Ok(width)
    }

    /// Format an address and mask-length into printable CIDR notation.
    pub fn cidr(&self, bits: u32) -> Result<String, AddressError> {
        let max = (self.len as u32) * 8;
        if bits > max {
            return Err(AddressError::PrefixTooLong { bits, max });
        }
        Ok(format!("{}/{}", self, bits))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len {
            0 => write!(f, "<null address>"),
            4 => {
                let octets = [self.buf[0], self.buf[1], self.buf[2], self.buf[3]];
                write!(f, "{}", Ipv4Addr::from(octets))
            }
            16 => write!(f, "{}", Ipv6Addr::from(self.buf)),
            n => write!(f, "<invalid address length {}>", n),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Self {
        Self::from_bytes(&addr.octets()).unwrap()
    }
}

impl From<Ipv6Addr> for Address {
    fn from(addr: Ipv6Addr) -> Self {
        Self::from_bytes(&addr.octets()).unwrap()
    }
}

/// A network/mask pair to match addresses against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMatch {
    pub addr: Address,
    pub mask: Address,
}

impl AddressMatch {
    /// Build a match from an arbitrary address and mask; the address is
    /// masked down to its network number so spurious host bits in the
    /// configuration cannot prevent matches.
    pub fn new(addr: Address, mask: Address) -> Result<Self, AddressError> {
        Ok(Self {
            addr: addr.subnet_of(&mask)?,
            mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Address {
        s.parse::<Ipv4Addr>().unwrap().into()
    }

    #[test]
    fn test_subnet_and_broadcast() {
        let addr = v4("192.168.10.77");
        let mask = v4("255.255.255.0");

        assert_eq!(addr.subnet_of(&mask).unwrap(), v4("192.168.10.0"));
        assert_eq!(addr.broadcast_of(&mask).unwrap(), v4("192.168.10.255"));
    }

    #[test]
    fn test_length_mismatch() {
        let addr = v4("192.168.10.77");
        let mask: Address = "ffff::".parse::<Ipv6Addr>().unwrap().into();

        assert_eq!(
            addr.subnet_of(&mask),
            Err(AddressError::LengthMismatch { addr: 4, mask: 16 })
        );
    }

    #[test]
    fn test_compose() {
        let subnet = v4("10.1.2.0");
        let mask = v4("255.255.255.0");

        assert_eq!(
            Address::compose(&subnet, &mask, 42).unwrap(),
            v4("10.1.2.42")
        );
        assert_eq!(
            Address::compose(&subnet, &mask, 300),
            Err(AddressError::HostOutOfRange)
        );
    }

    #[test]
    fn test_compose_wide_host() {
        let subnet = v4("10.0.0.0");
        let mask = v4("255.0.0.0");

        assert_eq!(
            Address::compose(&subnet, &mask, 0x00010203).unwrap(),
            v4("10.1.2.3")
        );
    }

    #[test]
    fn test_host_of() {
        let addr = v4("10.1.2.42");
        let mask = v4("255.255.255.0");

        assert_eq!(addr.host_of(&mask).unwrap(), 42);
    }

    #[test]
    fn test_matches() {
        let net = AddressMatch::new(v4("192.0.2.17"), v4("255.255.255.0")).unwrap();

        assert!(v4("192.0.2.200").matches(&net));
        assert!(!v4("192.0.3.1").matches(&net));
    }

    #[test]
    fn test_mask_width() {
        assert_eq!(v4("255.255.255.0").mask_width().unwrap(), 24);
        assert_eq!(v4("255.255.255.192").mask_width().unwrap(), 26);
        assert_eq!(v4("255.255.255.255").mask_width().unwrap(), 32);
        assert_eq!(v4("0.0.0.0").mask_width().unwrap(), 0);
    }

    #[test]
    fn test_cidr_format() {
        assert_eq!(v4("192.0.2.0").cidr(24).unwrap(), "192.0.2.0/24");

        let addr: Address = "2001:db8::".parse::<Ipv6Addr>().unwrap().into();
        assert_eq!(addr.cidr(32).unwrap(), "2001:db8::/32");
        assert!(addr.cidr(129).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(v4("192.0.2.1").to_string(), "192.0.2.1");
        assert_eq!(Address::NULL.to_string(), "<null address>");
    }
}
