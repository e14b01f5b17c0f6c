//! Rewrites A and AAAA records of an mDNS response to this host's addresses.
//!
//! A service announced from behind a network boundary (for example a container
//! bridge) carries addresses that are unreachable from the other side. Before the
//! server relays such a response onto its local network, every address record is
//! pointed at the host instead.

#[cfg(feature = "logging")]
use crate::log::trace;
use crate::{
    dns_parser::{
        read_name_at, u16_from_be_slice, DnsHeader, RRType, MSG_HEADER_LEN, RR_HEADER_REMAIN,
    },
    interfaces::HostAddressSet,
};
use std::{
    borrow::Cow,
    collections::HashMap,
    net::{Ipv4Addr, Ipv6Addr},
};

/// Overwrites the RDATA of A and AAAA records in `msg` with addresses from `hosts`.
///
/// Returns `Cow::Borrowed(msg)` when nothing changed, including when the message
/// is too short, truncated or otherwise cannot be walked safely. Returns
/// `Cow::Owned` with a new buffer when at least one byte was rewritten. No byte
/// other than address RDATA is touched, so names, compression pointers and
/// record lengths stay valid.
///
/// Repeated AAAA records with the same source address are mapped to successive
/// host IPv6 addresses, reusing the last one when there are more duplicates
/// than host addresses.
pub fn upgrade_address<'a>(msg: &'a [u8], hosts: &HostAddressSet) -> Cow<'a, [u8]> {
    if msg.len() < MSG_HEADER_LEN || hosts.is_empty() {
        return Cow::Borrowed(msg);
    }

    match rewrite_records(msg, hosts) {
        Some(out) if out.as_slice() != msg => Cow::Owned(out),
        _ => Cow::Borrowed(msg),
    }
}

/// Walks every record of `msg` and returns the rewritten copy, or `None` if the
/// walk ran off the end of the message.
fn rewrite_records(msg: &[u8], hosts: &HostAddressSet) -> Option<Vec<u8>> {
    let header = DnsHeader::parse(msg).ok()?;
    let mut out = msg.to_vec();
    let mut offset = MSG_HEADER_LEN;

    for _ in 0..header.question_count {
        let (_, next) = read_name_at(msg, offset).ok()?;
        offset = next + 4; // qtype and qclass
        if offset > msg.len() {
            return None;
        }
    }

    // Occurrences so far of each source AAAA address.
    let mut v6_seen: HashMap<[u8; 16], usize> = HashMap::new();

    for _ in 0..header.record_count() {
        let (name, next) = read_name_at(msg, offset).ok()?;
        offset = next;
        if offset + RR_HEADER_REMAIN > msg.len() {
            return None;
        }

        let ty = u16_from_be_slice(&msg[offset..offset + 2]);
        let rdlength = u16_from_be_slice(&msg[offset + 8..offset + 10]) as usize;
        offset += RR_HEADER_REMAIN;
        let end = offset + rdlength;
        if end > msg.len() {
            return None;
        }

        match RRType::from_u16(ty) {
            Some(RRType::A) if rdlength == 4 => {
                if let Some(ip) = hosts.ipv4 {
                    let old = Ipv4Addr::new(
                        msg[offset],
                        msg[offset + 1],
                        msg[offset + 2],
                        msg[offset + 3],
                    );
                    trace!("rewrite A {}: {} -> {}", name, old, ip);
                    out[offset..end].copy_from_slice(&ip.octets());
                }
            }
            Some(RRType::AAAA) if rdlength == 16 && !hosts.ipv6.is_empty() => {
                let mut source = [0u8; 16];
                source.copy_from_slice(&msg[offset..end]);

                let seen = v6_seen.entry(source).or_insert(0);
                let ip = hosts.ipv6[(*seen).min(hosts.ipv6.len() - 1)];
                *seen += 1;

                trace!("rewrite AAAA {}: {} -> {}", name, Ipv6Addr::from(source), ip);
                out[offset..end].copy_from_slice(&ip.octets());
            }
            _ => {}
        }

        offset = end;
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::upgrade_address;
    use crate::{
        dns_parser::{
            decode, encode, DnsHeader, DnsQuestion, DnsResourceRecord, RData, RRType, CLASS_IN,
            FLAGS_QR_RESPONSE,
        },
        interfaces::HostAddressSet,
    };
    use std::{
        borrow::Cow,
        net::{Ipv4Addr, Ipv6Addr},
    };
    use test_log::test;

    fn v6(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn a_record(name: &str, ip: [u8; 4]) -> DnsResourceRecord {
        DnsResourceRecord::new(name, RRType::A, CLASS_IN, 120, RData::A(Ipv4Addr::from(ip)))
    }

    fn aaaa_record(name: &str, ip: &str) -> DnsResourceRecord {
        DnsResourceRecord::new(name, RRType::AAAA, CLASS_IN, 120, RData::AAAA(v6(ip)))
    }

    fn response(answers: &[DnsResourceRecord], additionals: &[DnsResourceRecord]) -> Vec<u8> {
        let header = DnsHeader::new(0, FLAGS_QR_RESPONSE);
        let questions = [DnsQuestion::new("matterbridge.local", RRType::ANY, CLASS_IN)];
        encode(&header, &questions, answers, &[], additionals).unwrap()
    }

    #[test]
    fn test_rewrite_a_record() {
        let msg = response(&[a_record("matterbridge.local", [172, 17, 0, 2])], &[]);
        let hosts = HostAddressSet {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 5)),
            ipv6: vec![],
        };

        let out = upgrade_address(&msg, &hosts);
        assert!(matches!(out, Cow::Owned(_)));
        assert_eq!(out.len(), msg.len());

        let decoded = decode(&out).unwrap();
        assert_eq!(decoded.answers[0].data.to_string(), "10.0.0.5");
        assert_eq!(decoded.answers[0].name, "matterbridge.local");
    }

    #[test]
    fn test_short_message_is_borrowed() {
        let msg = [0u8; 11];
        let hosts = HostAddressSet {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 5)),
            ipv6: vec![],
        };
        let out = upgrade_address(&msg, &hosts);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert!(std::ptr::eq(out.as_ref(), &msg[..]));
    }

    #[test]
    fn test_duplicate_aaaa_get_distinct_hosts() {
        let msg = response(
            &[aaaa_record("matterbridge.local", "fd00::99")],
            &[aaaa_record("matterbridge.local", "fd00::99")],
        );
        let hosts = HostAddressSet {
            ipv4: None,
            ipv6: vec![v6("fd00::1"), v6("fd00::2")],
        };

        let out = upgrade_address(&msg, &hosts);
        let decoded = decode(&out).unwrap();
        assert_eq!(decoded.answers[0].data.to_string(), "fd00:0:0:0:0:0:0:1");
        assert_eq!(decoded.additionals[0].data.to_string(), "fd00:0:0:0:0:0:0:2");
    }

    #[test]
    fn test_aaaa_overflow_reuses_last() {
        let records: Vec<DnsResourceRecord> = (0..3)
            .map(|_| aaaa_record("dup.local", "fd00::99"))
            .chain(std::iter::once(aaaa_record("other.local", "fd00::42")))
            .collect();
        let msg = response(&records, &[]);
        let hosts = HostAddressSet {
            ipv4: None,
            ipv6: vec![v6("fd00::1"), v6("fd00::2")],
        };

        let decoded = decode(&upgrade_address(&msg, &hosts)).unwrap();
        let got: Vec<String> = decoded.answers.iter().map(|r| r.data.to_string()).collect();
        assert_eq!(
            got,
            vec![
                "fd00:0:0:0:0:0:0:1",
                "fd00:0:0:0:0:0:0:2",
                "fd00:0:0:0:0:0:0:2",
                // A different source address starts from the first host address.
                "fd00:0:0:0:0:0:0:1",
            ]
        );
    }

    #[test]
    fn test_nothing_to_rewrite_is_borrowed() {
        let msg = response(&[a_record("matterbridge.local", [172, 17, 0, 2])], &[]);

        // No host addresses.
        let out = upgrade_address(&msg, &HostAddressSet::default());
        assert!(matches!(out, Cow::Borrowed(_)));

        // Only IPv6 host addresses for an A-only message.
        let hosts = HostAddressSet {
            ipv4: None,
            ipv6: vec![v6("fd00::1")],
        };
        assert!(matches!(upgrade_address(&msg, &hosts), Cow::Borrowed(_)));

        // Record already carries the host address.
        let hosts = HostAddressSet {
            ipv4: Some(Ipv4Addr::new(172, 17, 0, 2)),
            ipv6: vec![],
        };
        assert!(matches!(upgrade_address(&msg, &hosts), Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncated_tail_is_borrowed() {
        let msg = response(
            &[a_record("a.local", [172, 17, 0, 2])],
            &[a_record("b.local", [172, 17, 0, 3])],
        );
        let hosts = HostAddressSet {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 5)),
            ipv6: vec![],
        };

        // Cut into the second record's RDATA: no partial rewrite of the first.
        let truncated = &msg[..msg.len() - 2];
        let out = upgrade_address(truncated, &hosts);
        assert!(matches!(out, Cow::Borrowed(_)));

        // Cut into the second record's fixed fields.
        let truncated = &msg[..msg.len() - 8];
        assert!(matches!(upgrade_address(truncated, &hosts), Cow::Borrowed(_)));
    }

    #[test]
    fn test_other_records_untouched() {
        let srv = DnsResourceRecord::new(
            "bridge._matter._tcp.local",
            RRType::SRV,
            CLASS_IN,
            120,
            RData::Srv {
                priority: 0,
                weight: 0,
                port: 5540,
                target: "matterbridge.local".to_string(),
            },
        );
        // An A record with a bad RDLENGTH is left alone.
        let bad_a = DnsResourceRecord {
            name: "bad.local".to_string(),
            ty: RRType::A as u16,
            class: CLASS_IN,
            ttl: 1,
            rdlength: 0,
            data: RData::Unknown(vec![1, 2, 3, 4, 5]),
        };
        let msg = response(
            &[srv, bad_a],
            &[a_record("matterbridge.local", [172, 17, 0, 2])],
        );
        let hosts = HostAddressSet {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 5)),
            ipv6: vec![],
        };

        let out = upgrade_address(&msg, &hosts);
        let changed: Vec<usize> = msg
            .iter()
            .zip(out.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect();

        // Only the last 4 bytes, the trailing A record's RDATA, differ.
        assert_eq!(changed.len(), 3);
        assert!(changed.iter().all(|i| *i >= msg.len() - 4));
        assert_eq!(&out[msg.len() - 4..], &[10, 0, 0, 5]);
    }

    #[test]
    fn test_compressed_names() {
        // Answer name is a pointer to the question name.
        let mut msg = vec![0, 0, 0x84, 0, 0, 1, 0, 1, 0, 0, 0, 0];
        msg.extend_from_slice(&[12]);
        msg.extend_from_slice(b"matterbridge");
        msg.extend_from_slice(&[5]);
        msg.extend_from_slice(b"local");
        msg.extend_from_slice(&[0, 0, 1, 0, 1]);
        msg.extend_from_slice(&[0xC0, 12, 0, 1, 0, 1, 0, 0, 0, 120, 0, 4, 172, 17, 0, 2]);

        let hosts = HostAddressSet {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 5)),
            ipv6: vec![],
        };
        let out = upgrade_address(&msg, &hosts);
        assert_eq!(&out[..msg.len() - 4], &msg[..msg.len() - 4]);
        assert_eq!(&out[msg.len() - 4..], &[10, 0, 0, 5]);
    }
}
