//! DNS wire codec for the subset of messages carried by mDNS.
//!
//! [decode] turns one datagram into a [DnsMessage], [encode] writes the sections
//! back out. Names are never compressed when encoding, while the decoder follows
//! compression pointers with a bounded number of hops.

#[cfg(feature = "logging")]
use crate::log::trace;
use crate::{Error, Result};
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

/// DNS resource record types, stored as `u16`. Can do `as u16` when needed.
///
/// See [RFC 1035 section 3.2.2](https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.2)
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[non_exhaustive]
#[repr(u16)]
pub enum RRType {
    /// DNS record type for IPv4 address
    A = 1,

    /// DNS record type for Name Server
    NS = 2,

    /// DNS record type for Canonical Name
    CNAME = 5,

    /// DNS record type for Pointer
    PTR = 12,

    /// DNS record type for Host Info
    HINFO = 13,

    /// DNS record type for Text (properties)
    TXT = 16,

    /// DNS record type for IPv6 address
    AAAA = 28,

    /// DNS record type for Service
    SRV = 33,

    /// DNS record type for Negative Responses
    NSEC = 47,

    /// DNS record type for any records (wildcard)
    ANY = 255,
}

impl RRType {
    /// Converts `u16` into `RRType` if possible.
    pub const fn from_u16(value: u16) -> Option<RRType> {
        match value {
            1 => Some(RRType::A),
            2 => Some(RRType::NS),
            5 => Some(RRType::CNAME),
            12 => Some(RRType::PTR),
            13 => Some(RRType::HINFO),
            16 => Some(RRType::TXT),
            28 => Some(RRType::AAAA),
            33 => Some(RRType::SRV),
            47 => Some(RRType::NSEC),
            255 => Some(RRType::ANY),
            _ => None,
        }
    }
}

impl fmt::Display for RRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RRType::A => "A",
            RRType::NS => "NS",
            RRType::CNAME => "CNAME",
            RRType::PTR => "PTR",
            RRType::HINFO => "HINFO",
            RRType::TXT => "TXT",
            RRType::AAAA => "AAAA",
            RRType::SRV => "SRV",
            RRType::NSEC => "NSEC",
            RRType::ANY => "ANY",
        };
        f.write_str(name)
    }
}

/// Returns the mnemonic of a record type code, or `TYPE<n>` for unknown codes.
pub fn rr_type_name(ty: u16) -> String {
    match RRType::from_u16(ty) {
        Some(rr_type) => rr_type.to_string(),
        None => format!("TYPE{}", ty),
    }
}

/// The class value for the Internet.
pub const CLASS_IN: u16 = 1;
pub const CLASS_MASK: u16 = 0x7FFF;

/// Cache-flush bit: the most significant bit of the rrclass field of the resource record.
pub const CLASS_CACHE_FLUSH: u16 = 0x8000;

/// Unicast-response bit ("QU"): the most significant bit of the qclass field of a question.
pub const CLASS_UNICAST_RESPONSE: u16 = 0x8000;

/// Max size of UDP datagram payload.
///
/// It is calculated as: 9000 bytes - IP header 20 bytes - UDP header 8 bytes.
/// Reference: [RFC6762 section 17](https://datatracker.ietf.org/doc/html/rfc6762#section-17)
pub const MAX_MSG_ABSOLUTE: usize = 8972;

/// Size of the fixed message header.
pub const MSG_HEADER_LEN: usize = 12;

/// Max number of compression pointers followed while reading one name.
pub const MAX_POINTER_HOPS: usize = 10;

const MAX_LABEL_LEN: usize = 63;
const MAX_TXT_ENTRY_LEN: usize = 255;

// Definitions for DNS message header "flags" field
//
// The "flags" field is 16-bit long, in this format:
// (RFC 1035 section 4.1.1)
//
//   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
// |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//
pub const FLAGS_QR_MASK: u16 = 0x8000; // mask for query/response bit

/// Flag bit to indicate a query
pub const FLAGS_QR_QUERY: u16 = 0x0000;

/// Flag bit to indicate a response
pub const FLAGS_QR_RESPONSE: u16 = 0x8000;

/// Flag bit for Authoritative Answer
pub const FLAGS_AA: u16 = 0x0400;

/// mask for TC(Truncated) bit
pub const FLAGS_TC: u16 = 0x0200;

const FLAGS_RD: u16 = 0x0100;
const FLAGS_RA: u16 = 0x0080;

const U16_SIZE: usize = 2;

/// The fixed 12-byte header of a DNS message, with the flags word broken out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl DnsHeader {
    /// Creates a header with all flag bits taken from `flags` and zero counts.
    pub fn new(id: u16, flags: u16) -> Self {
        Self {
            id,
            qr: (flags & FLAGS_QR_MASK) == FLAGS_QR_RESPONSE,
            opcode: ((flags >> 11) & 0x0F) as u8,
            aa: (flags & FLAGS_AA) != 0,
            tc: (flags & FLAGS_TC) != 0,
            rd: (flags & FLAGS_RD) != 0,
            ra: (flags & FLAGS_RA) != 0,
            z: ((flags >> 4) & 0x07) as u8,
            rcode: (flags & 0x0F) as u8,
            ..Default::default()
        }
    }

    /// Reads only the fixed header. Enough to classify a message without
    /// decoding its sections.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MSG_HEADER_LEN {
            return Err(Error::MalformedMessage(format!(
                "header is too short: {} bytes",
                data.len()
            )));
        }

        let mut header = Self::new(
            u16_from_be_slice(&data[..2]),
            u16_from_be_slice(&data[2..4]),
        );
        header.question_count = u16_from_be_slice(&data[4..6]);
        header.answer_count = u16_from_be_slice(&data[6..8]);
        header.authority_count = u16_from_be_slice(&data[8..10]);
        header.additional_count = u16_from_be_slice(&data[10..12]);
        Ok(header)
    }

    /// Packs the flag fields back into the 16-bit flags word.
    pub fn flags(&self) -> u16 {
        let mut flags = ((self.opcode as u16 & 0x0F) << 11)
            | ((self.z as u16 & 0x07) << 4)
            | (self.rcode as u16 & 0x0F);
        if self.qr {
            flags |= FLAGS_QR_RESPONSE;
        }
        if self.aa {
            flags |= FLAGS_AA;
        }
        if self.tc {
            flags |= FLAGS_TC;
        }
        if self.rd {
            flags |= FLAGS_RD;
        }
        if self.ra {
            flags |= FLAGS_RA;
        }
        flags
    }

    pub const fn is_query(&self) -> bool {
        !self.qr
    }

    pub const fn is_response(&self) -> bool {
        self.qr
    }

    /// Total number of resource records across answers, authorities and additionals.
    pub fn record_count(&self) -> usize {
        self.answer_count as usize + self.authority_count as usize + self.additional_count as usize
    }
}

/// Returns true if `data` starts with a zero transaction id, which every mDNS
/// message must have. Used as a cheap filter before any decoding.
pub fn has_mdns_id(data: &[u8]) -> bool {
    data.len() >= U16_SIZE && data[0] == 0 && data[1] == 0
}

/// A DNS question entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub ty: u16,
    /// Lower 15 bits are the class, the top bit is the QU flag.
    pub class: u16,
}

impl DnsQuestion {
    pub fn new(name: &str, ty: RRType, class: u16) -> Self {
        Self {
            name: name.to_string(),
            ty: ty as u16,
            class,
        }
    }

    pub fn rr_type(&self) -> Option<RRType> {
        RRType::from_u16(self.ty)
    }

    pub fn class_value(&self) -> u16 {
        self.class & CLASS_MASK
    }

    /// Whether the querier accepts a unicast response.
    pub fn unicast_response(&self) -> bool {
        (self.class & CLASS_UNICAST_RESPONSE) != 0
    }
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.name,
            class_name(self.class_value()),
            rr_type_name(self.ty)
        )?;
        if self.unicast_response() {
            write!(f, "\t[QU]")?;
        }
        Ok(())
    }
}

/// Decoded RDATA of a resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    /// A single domain name: PTR, NS or CNAME.
    Name(String),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Txt(Vec<String>),
    NSec {
        next_domain: String,
        types: Vec<u16>,
    },
    /// Any other type, kept as raw bytes.
    Unknown(Vec<u8>),
}

impl RData {
    fn write(&self, packet: &mut DnsOutPacket) -> Result<()> {
        match self {
            RData::A(addr) => packet.write_bytes(&addr.octets()),
            RData::AAAA(addr) => packet.write_bytes(&addr.octets()),
            RData::Name(name) => packet.write_name(name)?,
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                packet.write_short(*priority);
                packet.write_short(*weight);
                packet.write_short(*port);
                packet.write_name(target)?;
            }
            RData::Txt(entries) => packet.write_bytes(&encode_txt(entries)?),
            RData::NSec { next_domain, types } => {
                packet.write_name(next_domain)?;
                packet.write_bytes(&encode_type_bitmap(types));
            }
            RData::Unknown(bytes) => packet.write_bytes(bytes),
        }
        Ok(())
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "{}", addr),
            RData::AAAA(addr) => f.write_str(&expanded_ipv6(addr)),
            RData::Name(name) => f.write_str(name),
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}", priority, weight, port, target),
            RData::Txt(entries) => f.write_str(&entries.join(", ")),
            RData::NSec { next_domain, types } => {
                let names: Vec<String> = types.iter().map(|ty| rr_type_name(*ty)).collect();
                write!(f, "{} [{}]", next_domain, names.join(", "))
            }
            RData::Unknown(bytes) => f.write_str(&u8_slice_to_hex(bytes)),
        }
    }
}

/// A DNS Resource Record.
/// RFC: https://www.rfc-editor.org/rfc/rfc1035#section-3.2.1
///      https://www.rfc-editor.org/rfc/rfc1035#section-4.1.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResourceRecord {
    pub name: String,
    pub ty: u16,
    /// Lower 15 bits are the class, the top bit is the cache-flush flag.
    pub class: u16,
    pub ttl: u32, // in seconds
    /// Length of the RDATA as found on the wire. Recomputed on encode.
    pub rdlength: u16,
    pub data: RData,
}

impl DnsResourceRecord {
    /// Creates a record. `rdlength` is left at 0 until the record is written or read.
    pub fn new(name: &str, ty: RRType, class: u16, ttl: u32, data: RData) -> Self {
        Self {
            name: name.to_string(),
            ty: ty as u16,
            class,
            ttl,
            rdlength: 0,
            data,
        }
    }

    pub fn rr_type(&self) -> Option<RRType> {
        RRType::from_u16(self.ty)
    }

    pub fn class_value(&self) -> u16 {
        self.class & CLASS_MASK
    }

    pub fn cache_flush(&self) -> bool {
        (self.class & CLASS_CACHE_FLUSH) != 0
    }
}

impl fmt::Display for DnsResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name,
            self.ttl,
            class_name(self.class_value()),
            rr_type_name(self.ty),
            self.data
        )?;
        if self.cache_flush() {
            write!(f, "\t[cache-flush]")?;
        }
        Ok(())
    }
}

/// A decoded DNS message. It could be a query or a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub authorities: Vec<DnsResourceRecord>,
    pub additionals: Vec<DnsResourceRecord>,
}

impl DnsMessage {
    pub const fn is_query(&self) -> bool {
        self.header.is_query()
    }

    pub const fn is_response(&self) -> bool {
        self.header.is_response()
    }

    pub fn all_records(&self) -> impl Iterator<Item = &DnsResourceRecord> {
        self.answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
    }

    /// Names of all questions and records, in wire order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.questions
            .iter()
            .map(|q| q.name.as_str())
            .chain(self.all_records().map(|r| r.name.as_str()))
    }

    /// Encodes this message. The header counts are taken from the sections.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(
            &self.header,
            &self.questions,
            &self.answers,
            &self.authorities,
            &self.additionals,
        )
    }
}

impl fmt::Display for DnsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(
            f,
            ";; id {}, {}, opcode {}, rcode {}{}{}",
            h.id,
            if h.qr { "response" } else { "query" },
            h.opcode,
            h.rcode,
            if h.aa { ", aa" } else { "" },
            if h.tc { ", tc" } else { "" },
        )?;

        writeln!(f, ";; QUESTION ({})", self.questions.len())?;
        for q in self.questions.iter() {
            writeln!(f, "{}", q)?;
        }

        let sections = [
            ("ANSWER", &self.answers),
            ("AUTHORITY", &self.authorities),
            ("ADDITIONAL", &self.additionals),
        ];
        for (title, records) in sections.iter() {
            if records.is_empty() {
                continue;
            }
            writeln!(f, ";; {} ({})", title, records.len())?;
            for r in records.iter() {
                writeln!(f, "{}", r)?;
            }
        }
        Ok(())
    }
}

/// Decodes one DNS message.
///
/// Fails if the header is short or any section cannot be fully read for the
/// counts declared in the header.
pub fn decode(data: &[u8]) -> Result<DnsMessage> {
    let mut incoming = DnsIncoming { data, offset: 0 };

    /*
    RFC 1035 section 4.1: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1

        +---------------------+
        |        Header       |
        +---------------------+
        |       Question      | the question for the name server
        +---------------------+
        |        Answer       | RRs answering the question
        +---------------------+
        |      Authority      | RRs pointing toward an authority
        +---------------------+
        |      Additional     | RRs holding additional information
        +---------------------+
     */
    let header = incoming.read_header()?;
    let questions = incoming.read_questions(header.question_count)?;
    let answers = incoming.read_rr_records(header.answer_count)?;
    let authorities = incoming.read_rr_records(header.authority_count)?;
    let additionals = incoming.read_rr_records(header.additional_count)?;

    Ok(DnsMessage {
        header,
        questions,
        answers,
        authorities,
        additionals,
    })
}

/// Cursor over an incoming message.
struct DnsIncoming<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> DnsIncoming<'a> {
    fn read_header(&mut self) -> Result<DnsHeader> {
        let header = DnsHeader::parse(self.data)?;
        self.offset = MSG_HEADER_LEN;

        trace!(
            "read_header: id {}, {} questions {} answers {} authorities {} additionals",
            header.id,
            header.question_count,
            header.answer_count,
            header.authority_count,
            header.additional_count
        );
        Ok(header)
    }

    fn read_questions(&mut self, count: u16) -> Result<Vec<DnsQuestion>> {
        let mut questions = Vec::new();
        for i in 0..count {
            let name = self.read_name()?;

            let data = &self.data[self.offset..];
            if data.len() < 4 {
                return Err(Error::MalformedMessage(format!(
                    "question idx {} too short: {}",
                    i,
                    data.len()
                )));
            }
            let ty = u16_from_be_slice(&data[..2]);
            let class = u16_from_be_slice(&data[2..4]);
            self.offset += 4;

            questions.push(DnsQuestion { name, ty, class });
        }
        Ok(questions)
    }

    /// Decodes a sequence of RR records (in answers, authorities and additionals).
    fn read_rr_records(&mut self, count: u16) -> Result<Vec<DnsResourceRecord>> {
        // RFC 1035: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.1
        //
        // All RRs have the same top level format shown below:
        //                               1  1  1  1  1  1
        // 0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // /                      NAME                     /
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                      TYPE                     |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                     CLASS                     |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                      TTL                      |
        // |                                               |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                   RDLENGTH                    |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
        // /                     RDATA                     /
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        let mut records = Vec::new();

        for _ in 0..count {
            let name = self.read_name()?;
            let slice = &self.data[self.offset..];

            if slice.len() < RR_HEADER_REMAIN {
                return Err(Error::MalformedMessage(format!(
                    "RR '{}' is too short after name: {} bytes",
                    &name,
                    slice.len()
                )));
            }

            let ty = u16_from_be_slice(&slice[..2]);
            let class = u16_from_be_slice(&slice[2..4]);
            let ttl = u32_from_be_slice(&slice[4..8]);
            let rdlength = u16_from_be_slice(&slice[8..10]);
            self.offset += RR_HEADER_REMAIN;
            let next_offset = self.offset + rdlength as usize;

            if next_offset > self.data.len() {
                return Err(Error::MalformedMessage(format!(
                    "RR {} RDATA length {} is invalid: remain data len: {}",
                    name,
                    rdlength,
                    self.data.len() - self.offset
                )));
            }

            let data = self.read_rdata(ty, rdlength as usize, next_offset)?;

            if self.offset != next_offset {
                return Err(Error::MalformedMessage(format!(
                    "decode offset error for RData type {} offset: {} expected offset: {}",
                    ty, self.offset, next_offset,
                )));
            }

            let record = DnsResourceRecord {
                name,
                ty,
                class,
                ttl,
                rdlength,
                data,
            };
            trace!("read_rr_records: {:?}", &record);
            records.push(record);
        }

        Ok(records)
    }

    fn read_rdata(&mut self, ty: u16, rdlength: usize, end: usize) -> Result<RData> {
        let rdata = match RRType::from_u16(ty) {
            Some(RRType::A) => {
                if rdlength != 4 {
                    return Err(Error::MalformedMessage(format!(
                        "A record with RDLENGTH {}",
                        rdlength
                    )));
                }
                RData::A(self.read_ipv4())
            }
            Some(RRType::AAAA) => {
                if rdlength != 16 {
                    return Err(Error::MalformedMessage(format!(
                        "AAAA record with RDLENGTH {}",
                        rdlength
                    )));
                }
                RData::AAAA(self.read_ipv6())
            }
            Some(RRType::PTR) | Some(RRType::NS) | Some(RRType::CNAME) => {
                RData::Name(self.read_name()?)
            }
            Some(RRType::SRV) => RData::Srv {
                priority: self.read_u16()?,
                weight: self.read_u16()?,
                port: self.read_u16()?,
                target: self.read_name()?,
            },
            Some(RRType::TXT) => RData::Txt(self.read_txt(end)?),
            Some(RRType::NSEC) => RData::NSec {
                next_domain: self.read_name()?,
                types: self.read_type_bitmap(end)?,
            },
            _ => RData::Unknown(self.read_vec(rdlength)),
        };
        Ok(rdata)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let slice = &self.data[self.offset..];
        if slice.len() < U16_SIZE {
            return Err(Error::MalformedMessage(format!(
                "read_u16: slice len is only {}",
                slice.len()
            )));
        }
        let num = u16_from_be_slice(&slice[..U16_SIZE]);
        self.offset += U16_SIZE;
        Ok(num)
    }

    /// Reads length-prefixed character strings until `end`.
    fn read_txt(&mut self, end: usize) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        while self.offset < end {
            let length = self.data[self.offset] as usize;
            self.offset += 1;
            if self.offset + length > end {
                return Err(Error::MalformedMessage(format!(
                    "TXT entry of {} bytes overruns RDATA at offset {}",
                    length, self.offset
                )));
            }
            let entry = &self.data[self.offset..self.offset + length];
            entries.push(String::from_utf8_lossy(entry).into_owned());
            self.offset += length;
        }
        Ok(entries)
    }

    /// Reads the "Type Bit Maps" field of a NSEC record up to `end`.
    fn read_type_bitmap(&mut self, end: usize) -> Result<Vec<u16>> {
        // From RFC 4034: 4.1.2 The Type Bit Maps Field
        // https://datatracker.ietf.org/doc/html/rfc4034#section-4.1.2
        //
        // Each bitmap encodes the low-order 8 bits of RR types within the
        // window block, in network bit order.  The first bit is bit 0.  For
        // window block 0, bit 1 corresponds to RR type 1 (A), bit 2 corresponds
        // to RR type 2 (NS), and so forth.
        let mut types = Vec::new();

        while self.offset < end {
            if self.offset + 2 > end {
                return Err(Error::MalformedMessage(format!(
                    "NSEC window block header truncated at offset {}",
                    self.offset
                )));
            }
            let window = self.data[self.offset] as u16;
            let block_len = self.data[self.offset + 1] as usize;
            self.offset += 2;

            if !(1..=32).contains(&block_len) {
                return Err(Error::MalformedMessage(format!(
                    "NSEC block length must be in the range 1-32: {}",
                    block_len
                )));
            }
            if self.offset + block_len > end {
                return Err(Error::MalformedMessage(format!(
                    "NSEC block overflow: {} over RData end {}",
                    self.offset + block_len,
                    end
                )));
            }

            for (i, byte) in self.data[self.offset..self.offset + block_len]
                .iter()
                .enumerate()
            {
                let mut bit_mask: u8 = 0x80; // for bit 0 in network bit order
                for bit in 0..8u16 {
                    if (byte & bit_mask) != 0 {
                        types.push(window * 256 + i as u16 * 8 + bit);
                    }
                    bit_mask >>= 1;
                }
            }
            self.offset += block_len;
        }
        Ok(types)
    }

    fn read_vec(&mut self, length: usize) -> Vec<u8> {
        let v = self.data[self.offset..self.offset + length].to_vec();
        self.offset += length;
        v
    }

    fn read_ipv4(&mut self) -> Ipv4Addr {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + 4]);
        self.offset += bytes.len();
        Ipv4Addr::from(bytes)
    }

    fn read_ipv6(&mut self) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + 16]);
        self.offset += bytes.len();
        Ipv6Addr::from(bytes)
    }

    fn read_name(&mut self) -> Result<String> {
        let (name, next) = read_name_at(self.data, self.offset)?;
        self.offset = next;
        Ok(name)
    }
}

// Must have at least TYPE, CLASS, TTL, RDLENGTH fields: 10 bytes.
pub(crate) const RR_HEADER_REMAIN: usize = 10;

/// Reads a domain name starting at `start`.
///
/// Returns the dotted name (without a trailing dot) and the offset right after
/// the name at its original position. Compression pointers are offsets from
/// the start of `data`.
///
/// See https://datatracker.ietf.org/doc/html/rfc1035#section-3.1 for
/// domain name encoding.
pub(crate) fn read_name_at(data: &[u8], start: usize) -> Result<(String, usize)> {
    if start >= data.len() {
        return Err(Error::OffsetOutOfBounds(start));
    }

    let mut offset = start;
    let mut labels: Vec<String> = Vec::new();
    let mut name_end: Option<usize> = None;
    let mut hops = 0;

    // From RFC1035:
    // "...The compression scheme allows a domain name in a message to be
    // represented as either:
    // - a sequence of labels ending in a zero octet
    // - a pointer
    // - a sequence of labels ending with a pointer"
    loop {
        let length = match data.get(offset) {
            Some(length) => *length,
            None => return Err(Error::LabelOutOfBounds(offset)),
        };

        match length & 0xC0 {
            0x00 if length == 0 => {
                offset += 1;
                break;
            }
            0x00 => {
                let begin = offset + 1;
                let ending = begin + length as usize;

                // Never read beyond the whole data length.
                if ending > data.len() {
                    return Err(Error::LabelOutOfBounds(offset));
                }
                labels.push(String::from_utf8_lossy(&data[begin..ending]).into_owned());
                offset = ending;
            }
            0xC0 => {
                // Message compression.
                // See https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4
                if offset + U16_SIZE > data.len() {
                    return Err(Error::IncompletePointer(offset));
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::TooManyIterations);
                }

                // A pointer marks the end of a domain name.
                if name_end.is_none() {
                    name_end = Some(offset + U16_SIZE);
                }

                let pointer = (u16_from_be_slice(&data[offset..]) & 0x3FFF) as usize;
                if pointer >= data.len() {
                    return Err(Error::OffsetOutOfBounds(pointer));
                }
                offset = pointer;
            }
            _ => {
                return Err(Error::MalformedMessage(format!(
                    "Bad name with invalid length: 0x{:x} offset {}",
                    length, offset
                )));
            }
        }
    }

    Ok((labels.join("."), name_end.unwrap_or(offset)))
}

/// A single outgoing DNS packet being assembled.
struct DnsOutPacket {
    data: Vec<u8>,
}

impl DnsOutPacket {
    fn new() -> Self {
        Self {
            data: Vec::with_capacity(MSG_HEADER_LEN),
        }
    }

    /// Writes the header fields.
    ///
    /// The header format is based on RFC 1035 section 4.1.1:
    /// https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
    //
    //                                  1  1  1  1  1  1
    //    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                      ID                       |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    QDCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    ANCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    NSCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    ARCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //
    fn write_header(&mut self, header: &DnsHeader, counts: [usize; 4]) -> Result<()> {
        self.write_short(header.id);
        self.write_short(header.flags());
        for count in counts.iter() {
            if *count > u16::MAX as usize {
                return Err(Error::MalformedMessage(format!(
                    "section with {} entries does not fit the header",
                    count
                )));
            }
            self.write_short(*count as u16);
        }
        Ok(())
    }

    fn write_question(&mut self, question: &DnsQuestion) -> Result<()> {
        self.write_name(&question.name)?;
        self.write_short(question.ty);
        self.write_short(question.class);
        Ok(())
    }

    /// Writes a record with its RDLENGTH computed from the encoded RDATA.
    fn write_record(&mut self, record: &DnsResourceRecord) -> Result<()> {
        self.write_name(&record.name)?;
        self.write_short(record.ty);
        self.write_short(record.class);
        self.write_u32(record.ttl);

        let length_at = self.data.len();
        self.write_short(0);
        record.data.write(self)?;

        let rdlength = self.data.len() - length_at - U16_SIZE;
        if rdlength > u16::MAX as usize {
            return Err(Error::MalformedMessage(format!(
                "RDATA of {} bytes for '{}' is too long",
                rdlength, record.name
            )));
        }
        self.data[length_at..length_at + U16_SIZE]
            .copy_from_slice(&(rdlength as u16).to_be_bytes());
        Ok(())
    }

    fn write_name(&mut self, name: &str) -> Result<()> {
        let encoded = encode_name(name)?;
        self.write_bytes(&encoded);
        Ok(())
    }

    fn write_bytes(&mut self, s: &[u8]) {
        self.data.extend_from_slice(s);
    }

    fn write_u32(&mut self, int: u32) {
        self.data.extend_from_slice(&int.to_be_bytes());
    }

    fn write_short(&mut self, short: u16) {
        self.data.extend_from_slice(&short.to_be_bytes());
    }
}

/// Encodes a message from its header and sections.
///
/// The count fields are taken from the section lengths, not from `header`,
/// and every RDLENGTH is the exact size of the written RDATA.
pub fn encode(
    header: &DnsHeader,
    questions: &[DnsQuestion],
    answers: &[DnsResourceRecord],
    authorities: &[DnsResourceRecord],
    additionals: &[DnsResourceRecord],
) -> Result<Vec<u8>> {
    let mut packet = DnsOutPacket::new();
    packet.write_header(
        header,
        [
            questions.len(),
            answers.len(),
            authorities.len(),
            additionals.len(),
        ],
    )?;

    for question in questions {
        packet.write_question(question)?;
    }
    for record in answers.iter().chain(authorities).chain(additionals) {
        packet.write_record(record)?;
    }

    Ok(packet.data)
}

/// Encodes `name` as uncompressed length-prefixed labels ending with a zero byte.
///
/// An empty name or "." is the root. A trailing dot is accepted.
pub fn encode_name(name: &str) -> Result<Vec<u8>> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    let mut out = Vec::with_capacity(trimmed.len() + 2);

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(Error::EmptyLabel(name.to_string()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong(label.to_string()));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }

    out.push(0);
    Ok(out)
}

/// Encodes TXT entries as length-prefixed strings. No entries yields no bytes.
pub fn encode_txt<S: AsRef<str>>(entries: &[S]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        let bytes = entry.as_ref().as_bytes();
        if bytes.len() > MAX_TXT_ENTRY_LEN {
            return Err(Error::EntryTooLong(bytes.len()));
        }
        out.push(bytes.len() as u8);
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// Parses a dotted-quad IPv4 address into its 4 wire bytes.
pub fn encode_a(addr: &str) -> Result<[u8; 4]> {
    addr.trim()
        .parse::<Ipv4Addr>()
        .map(|ip| ip.octets())
        .map_err(|_| Error::InvalidAddress(addr.to_string()))
}

/// Parses an IPv6 address into its 16 wire bytes.
///
/// Accepts `::` compression and ignores a trailing `%scope` suffix.
pub fn encode_aaaa(addr: &str) -> Result<[u8; 16]> {
    let without_scope = match addr.split_once('%') {
        Some((ip, _scope)) => ip,
        None => addr,
    };
    without_scope
        .trim()
        .parse::<Ipv6Addr>()
        .map(|ip| ip.octets())
        .map_err(|_| Error::InvalidAddress(addr.to_string()))
}

/// Renders 4 RDATA bytes as a dotted quad.
pub fn decode_a(bytes: &[u8]) -> Result<String> {
    if bytes.len() != 4 {
        return Err(Error::MalformedMessage(format!(
            "A RDATA must be 4 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string())
}

/// Renders 16 RDATA bytes as fully expanded colon-hex.
pub fn decode_aaaa(bytes: &[u8]) -> Result<String> {
    if bytes.len() != 16 {
        return Err(Error::MalformedMessage(format!(
            "AAAA RDATA must be 16 bytes, got {}",
            bytes.len()
        )));
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(bytes);
    Ok(expanded_ipv6(&Ipv6Addr::from(octets)))
}

/// Formats every group of `addr` without `::` compression, e.g. `fe80:0:0:0:0:0:0:1`.
fn expanded_ipv6(addr: &Ipv6Addr) -> String {
    let groups: Vec<String> = addr
        .segments()
        .iter()
        .map(|seg| format!("{:x}", seg))
        .collect();
    groups.join(":")
}

/// Builds NSEC window blocks for `types`.
fn encode_type_bitmap(types: &[u16]) -> Vec<u8> {
    let mut sorted = types.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let window = sorted[i] >> 8;
        let mut bitmap = [0u8; 32];
        let mut len = 0;
        while i < sorted.len() && sorted[i] >> 8 == window {
            let low = (sorted[i] & 0xFF) as usize;
            bitmap[low / 8] |= 0x80 >> (low % 8);
            len = low / 8 + 1;
            i += 1;
        }
        out.push(window as u8);
        out.push(len as u8);
        out.extend_from_slice(&bitmap[..len]);
    }
    out
}

fn class_name(class: u16) -> String {
    match class {
        CLASS_IN => "IN".to_string(),
        other => format!("CLASS{}", other),
    }
}

const HEX_TABLE: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Create a lowercase hex string from `slice`.
///
/// For example, [1u8, 0xab] -> "01ab"
fn u8_slice_to_hex(slice: &[u8]) -> String {
    let mut hex = String::with_capacity(slice.len() * 2);
    for b in slice {
        hex.push(HEX_TABLE[(b >> 4) as usize]);
        hex.push(HEX_TABLE[(b & 0x0F) as usize]);
    }
    hex
}

pub(crate) const fn u16_from_be_slice(bytes: &[u8]) -> u16 {
    let u8_array: [u8; 2] = [bytes[0], bytes[1]];
    u16::from_be_bytes(u8_array)
}

const fn u32_from_be_slice(s: &[u8]) -> u32 {
    let u8_array: [u8; 4] = [s[0], s[1], s[2], s[3]];
    u32::from_be_bytes(u8_array)
}

#[cfg(test)]
mod tests {
    use super::{
        decode, decode_a, decode_aaaa, encode, encode_a, encode_aaaa, encode_name, encode_txt,
        has_mdns_id, read_name_at, DnsHeader, DnsMessage, DnsQuestion, DnsResourceRecord, RData,
        RRType, CLASS_CACHE_FLUSH, CLASS_IN, CLASS_UNICAST_RESPONSE, FLAGS_AA, FLAGS_QR_RESPONSE,
    };
    use crate::Error;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use test_log::test;

    /// A header with the given counts, all flags zero.
    fn header_bytes(qd: u16, an: u16, ns: u16, ar: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 4];
        for count in [qd, an, ns, ar].iter() {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_decode_ptr_question() {
        let mut buf = header_bytes(1, 0, 0, 0);
        buf.extend_from_slice(&encode_name("_http._tcp.local").unwrap());
        buf.extend_from_slice(&(RRType::PTR as u16).to_be_bytes());
        buf.extend_from_slice(&CLASS_IN.to_be_bytes());

        let msg = decode(&buf).unwrap();
        assert_eq!(msg.header.question_count, 1);
        assert_eq!(msg.questions.len(), 1);
        assert_eq!(msg.questions[0].name, "_http._tcp.local");
        assert_eq!(msg.questions[0].rr_type(), Some(RRType::PTR));
        assert_eq!(msg.questions[0].class_value(), CLASS_IN);
        assert!(!msg.questions[0].unicast_response());
        assert!(msg.is_query());
    }

    #[test]
    fn test_short_header() {
        let result = decode(&[0u8; 11]);
        assert!(matches!(result, Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_truncated_sections_fail() {
        // Declares one question but carries none.
        let buf = header_bytes(1, 0, 0, 0);
        assert!(decode(&buf).is_err());

        // Declares two answers but carries one.
        let header = DnsHeader::new(0, FLAGS_QR_RESPONSE);
        let record = DnsResourceRecord::new(
            "host.local",
            RRType::A,
            CLASS_IN,
            120,
            RData::A(Ipv4Addr::new(10, 0, 0, 1)),
        );
        let mut buf = encode(&header, &[], &[record], &[], &[]).unwrap();
        buf[7] = 2;
        assert!(decode(&buf).is_err());
    }

    #[test]
    fn test_name_round_trip() {
        let names = [
            "matterbridge.local",
            "_matter._tcp.local",
            "a.b.c.d.e",
            &("x".repeat(63) + ".local"),
        ];
        for name in names.iter() {
            let encoded = encode_name(name).unwrap();
            let (decoded, next) = read_name_at(&encoded, 0).unwrap();
            assert_eq!(&decoded, name);
            assert_eq!(next, encoded.len());
        }

        // Trailing dot and root.
        assert_eq!(encode_name("local.").unwrap(), encode_name("local").unwrap());
        assert_eq!(encode_name("").unwrap(), vec![0]);
        assert_eq!(encode_name(".").unwrap(), vec![0]);
    }

    #[test]
    fn test_encode_name_errors() {
        let long = "y".repeat(64) + ".local";
        assert!(matches!(encode_name(&long), Err(Error::LabelTooLong(_))));
        assert!(matches!(encode_name("a..local"), Err(Error::EmptyLabel(_))));
    }

    #[test]
    fn test_compression_pointer() {
        // "local" at offset 0, then "host" followed by a pointer to offset 0.
        let mut buf = encode_name("local").unwrap();
        let host_at = buf.len();
        buf.push(4);
        buf.extend_from_slice(b"host");
        buf.extend_from_slice(&[0xC0, 0x00]);
        buf.push(0xFF); // trailing byte that belongs to something else

        let (name, next) = read_name_at(&buf, host_at).unwrap();
        assert_eq!(name, "host.local");
        assert_eq!(next, buf.len() - 1);
    }

    #[test]
    fn test_name_errors() {
        // Pointer to itself.
        let buf = [0xC0, 0x00];
        assert_eq!(read_name_at(&buf, 0), Err(Error::TooManyIterations));

        // Pointer missing its second byte.
        let buf = [3, b'a', b'b', b'c', 0xC0];
        assert_eq!(read_name_at(&buf, 0), Err(Error::IncompletePointer(4)));

        // Label runs past the buffer.
        let buf = [10, b'a', b'b'];
        assert_eq!(read_name_at(&buf, 0), Err(Error::LabelOutOfBounds(0)));

        // Starting offset already past the end.
        assert_eq!(read_name_at(&buf, 3), Err(Error::OffsetOutOfBounds(3)));

        // Pointer to beyond the buffer.
        let buf = [0xC0, 0x40];
        assert_eq!(read_name_at(&buf, 0), Err(Error::OffsetOutOfBounds(0x40)));
    }

    #[test]
    fn test_address_round_trip() {
        for addr in ["172.17.0.2", "10.0.0.5", "255.255.255.255"].iter() {
            let bytes = encode_a(addr).unwrap();
            assert_eq!(&decode_a(&bytes).unwrap(), addr);
        }

        let bytes = encode_aaaa("fe80::1").unwrap();
        assert_eq!(decode_aaaa(&bytes).unwrap(), "fe80:0:0:0:0:0:0:1");

        let bytes = encode_aaaa("fe80::1%eth0").unwrap();
        assert_eq!(decode_aaaa(&bytes).unwrap(), "fe80:0:0:0:0:0:0:1");

        let bytes = encode_aaaa("2001:db8:0:0:1:0:0:ff").unwrap();
        assert_eq!(decode_aaaa(&bytes).unwrap(), "2001:db8:0:0:1:0:0:ff");
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["1.2.3", "1.2.3.256", "a.b.c.d", ""].iter() {
            assert!(matches!(encode_a(bad), Err(Error::InvalidAddress(_))), "{}", bad);
        }
        for bad in ["1::2::3", "fe80::g", "1:2:3:4:5:6:7:8:9", "12345::1"].iter() {
            assert!(
                matches!(encode_aaaa(bad), Err(Error::InvalidAddress(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_encode_txt() {
        assert!(encode_txt::<&str>(&[]).unwrap().is_empty());
        assert_eq!(encode_txt(&["", "ab"]).unwrap(), vec![0, 2, b'a', b'b']);

        let long = "z".repeat(256);
        assert_eq!(encode_txt(&[long]), Err(Error::EntryTooLong(256)));
        assert_eq!(encode_txt(&["z".repeat(255)]).unwrap().len(), 256);
    }

    #[test]
    fn test_message_encode_decode() {
        let mut header = DnsHeader::new(0, FLAGS_QR_RESPONSE | FLAGS_AA);
        // Stale counts must be ignored by encode.
        header.answer_count = 9;

        let questions = vec![DnsQuestion::new(
            "_matter._tcp.local",
            RRType::PTR,
            CLASS_IN | CLASS_UNICAST_RESPONSE,
        )];
        let answers = vec![
            DnsResourceRecord::new(
                "_matter._tcp.local",
                RRType::PTR,
                CLASS_IN,
                4500,
                RData::Name("bridge._matter._tcp.local".to_string()),
            ),
            DnsResourceRecord::new(
                "bridge._matter._tcp.local",
                RRType::SRV,
                CLASS_IN | CLASS_CACHE_FLUSH,
                120,
                RData::Srv {
                    priority: 0,
                    weight: 0,
                    port: 5540,
                    target: "matterbridge.local".to_string(),
                },
            ),
        ];
        let additionals = vec![
            DnsResourceRecord::new(
                "bridge._matter._tcp.local",
                RRType::TXT,
                CLASS_IN,
                4500,
                RData::Txt(vec!["VP=65521+32769".to_string(), "SII=5000".to_string()]),
            ),
            DnsResourceRecord::new(
                "matterbridge.local",
                RRType::AAAA,
                CLASS_IN,
                120,
                RData::AAAA("fd00::99".parse::<Ipv6Addr>().unwrap()),
            ),
            DnsResourceRecord::new(
                "matterbridge.local",
                RRType::NSEC,
                CLASS_IN,
                120,
                RData::NSec {
                    next_domain: "matterbridge.local".to_string(),
                    types: vec![RRType::A as u16, RRType::AAAA as u16],
                },
            ),
        ];

        let buf = encode(&header, &questions, &answers, &[], &additionals).unwrap();
        assert!(has_mdns_id(&buf));

        let msg = decode(&buf).unwrap();
        assert!(msg.is_response());
        assert!(msg.header.aa);
        assert_eq!(msg.header.answer_count, 2);
        assert_eq!(msg.header.additional_count, 3);
        assert!(msg.questions[0].unicast_response());

        assert_eq!(msg.answers[0].data.to_string(), "bridge._matter._tcp.local");
        assert_eq!(msg.answers[1].data.to_string(), "0 0 5540 matterbridge.local");
        assert!(msg.answers[1].cache_flush());
        assert_eq!(
            msg.additionals[0].data.to_string(),
            "VP=65521+32769, SII=5000"
        );
        assert_eq!(msg.additionals[0].rdlength, 24);
        assert_eq!(msg.additionals[1].data.to_string(), "fd00:0:0:0:0:0:0:99");
        assert_eq!(msg.additionals[1].rdlength, 16);
        assert_eq!(
            msg.additionals[2].data.to_string(),
            "matterbridge.local [A, AAAA]"
        );

        // Re-encoding the decoded message gives the same bytes.
        assert_eq!(msg.to_bytes().unwrap(), buf);
    }

    #[test]
    fn test_compressed_ptr_rdata() {
        // Question "_hap._tcp.local", answer name and PTR target both compressed.
        let mut buf = header_bytes(1, 1, 0, 0);
        buf[2] = 0x84; // QR + AA
        let qname_at = buf.len() as u8;
        buf.extend_from_slice(&encode_name("_hap._tcp.local").unwrap());
        buf.extend_from_slice(&[0, 12, 0, 1]);

        buf.extend_from_slice(&[0xC0, qname_at]); // answer name
        buf.extend_from_slice(&[0, 12, 0, 1, 0, 0, 0x11, 0x94]);
        buf.extend_from_slice(&[0, 9]); // rdlength
        buf.push(6);
        buf.extend_from_slice(b"Bridge");
        buf.extend_from_slice(&[0xC0, qname_at]);

        let msg = decode(&buf).unwrap();
        assert_eq!(msg.answers[0].name, "_hap._tcp.local");
        assert_eq!(msg.answers[0].ttl, 4500);
        assert_eq!(
            msg.answers[0].data,
            RData::Name("Bridge._hap._tcp.local".to_string())
        );
    }

    #[test]
    fn test_unknown_and_bad_rdata() {
        let mut header = DnsHeader::new(0, FLAGS_QR_RESPONSE);
        header.answer_count = 1;
        let unknown = DnsResourceRecord {
            name: "x.local".to_string(),
            ty: 99,
            class: CLASS_IN,
            ttl: 1,
            rdlength: 0,
            data: RData::Unknown(vec![0xde, 0xad, 0x01]),
        };
        let buf = encode(&header, &[], &[unknown], &[], &[]).unwrap();
        let msg = decode(&buf).unwrap();
        assert_eq!(msg.answers[0].data.to_string(), "dead01");
        assert_eq!(msg.answers[0].to_string(), "x.local\t1\tIN\tTYPE99\tdead01");

        // An A record whose RDLENGTH is not 4.
        let bad_a = DnsResourceRecord {
            name: "x.local".to_string(),
            ty: RRType::A as u16,
            class: CLASS_IN,
            ttl: 1,
            rdlength: 0,
            data: RData::Unknown(vec![1, 2, 3]),
        };
        let buf = encode(&header, &[], &[bad_a], &[], &[]).unwrap();
        assert!(matches!(decode(&buf), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_header_flags() {
        let header = DnsHeader::parse(&[0x12, 0x34, 0x84, 0x00, 0, 1, 0, 2, 0, 3, 0, 4]).unwrap();
        assert_eq!(header.id, 0x1234);
        assert!(header.qr);
        assert!(header.aa);
        assert!(!header.tc);
        assert_eq!(header.record_count(), 9);
        assert_eq!(header.flags(), 0x8400);
        assert!(!has_mdns_id(&[0x12, 0x34]));
        assert!(!has_mdns_id(&[0]));
    }

    #[test]
    fn test_message_display() {
        let msg = DnsMessage {
            header: DnsHeader::new(0, FLAGS_QR_RESPONSE),
            answers: vec![DnsResourceRecord::new(
                "matterbridge.local",
                RRType::A,
                CLASS_IN | CLASS_CACHE_FLUSH,
                120,
                RData::A(Ipv4Addr::new(172, 17, 0, 2)),
            )],
            ..Default::default()
        };
        let text = msg.to_string();
        assert!(text.contains(";; ANSWER (1)"));
        assert!(text.contains("matterbridge.local\t120\tIN\tA\t172.17.0.2\t[cache-flush]"));
    }
}
