//! Capture reader for pcap and pcapng streams.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use tracing::debug;

use super::RawPacket;
use crate::error::{Error, PcapError as OurPcapError};
use crate::protocol::LINKTYPE_ETHERNET;

/// Buffer size for reading captures (64KB).
const BUFFER_SIZE: usize = 65536;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Legacy pcap global header length.
const LEGACY_HEADER_LEN: usize = 24;

/// Block type, block length and byte-order magic of a pcapng section header.
const NG_BLOCK_PREFIX_LEN: usize = 12;

/// Smallest pcapng section header block.
const NG_MIN_SECTION_HEADER_LEN: usize = 28;

const NG_BYTE_ORDER_MAGIC: u32 = 0x1a2b_3c4d;

/// Default pcapng timestamp resolution: microseconds.
const DEFAULT_TSRESOL: u8 = 6;

type BoxedRead = Box<dyn Read + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureFormat {
    Legacy,
    Ng,
}

/// Reader for pcap and pcapng captures, with optional gzip decompression.
///
/// The source only has to implement [`Read`] and may return short reads,
/// so pipes such as stdin work as well as files. The file header is read
/// up front and handed to the parser in one piece, since the parser reads
/// it with a single `read` call.
pub struct PcapReader {
    inner: ReaderInner,
    state: ReadState,
}

enum ReaderInner {
    Legacy(LegacyPcapReader<BufReader<BoxedRead>>),
    Ng(PcapNGReader<BufReader<BoxedRead>>),
}

/// Timestamp scaling for one pcapng interface.
#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: u16,
    units_per_second: u64,
    offset_us: i64,
}

struct ReadState {
    frame_number: u64,
    link_type: u16,
    nanosecond_timestamps: bool,
    interfaces: Vec<Interface>,
}

impl PcapReader {
    /// Open a capture file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| {
            Error::Pcap(OurPcapError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;
        Self::from_reader(Box::new(file))
    }

    /// Read a capture streamed on standard input, e.g. from `tcpdump -w -`.
    pub fn stdin() -> Result<Self, Error> {
        Self::from_reader(Box::new(io::stdin()))
    }

    /// Read a capture from any byte source.
    ///
    /// Gzip-compressed input is detected and decompressed transparently.
    pub fn from_reader(mut reader: BoxedRead) -> Result<Self, Error> {
        let mut magic = read_magic(&mut reader)?;
        if magic[..2] == GZIP_MAGIC {
            reader = Box::new(GzDecoder::new(Cursor::new(magic).chain(reader)));
            magic = read_magic(&mut reader)?;
        }

        let (format, header) = read_file_header(&mut reader, magic)?;
        let reader: BoxedRead = Box::new(Cursor::new(header).chain(reader));
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, reader);

        match format {
            CaptureFormat::Legacy => Self::open_legacy(buf_reader),
            CaptureFormat::Ng => Self::open_ng(buf_reader),
        }
    }

    fn open_legacy(reader: BufReader<BoxedRead>) -> Result<Self, Error> {
        let pcap_reader = LegacyPcapReader::new(BUFFER_SIZE, reader).map_err(|e| {
            Error::Pcap(OurPcapError::InvalidFormat {
                reason: format!("Failed to parse PCAP header: {e}"),
            })
        })?;

        Ok(Self {
            inner: ReaderInner::Legacy(pcap_reader),
            state: ReadState::new(),
        })
    }

    fn open_ng(reader: BufReader<BoxedRead>) -> Result<Self, Error> {
        let pcap_reader = PcapNGReader::new(BUFFER_SIZE, reader).map_err(|e| {
            Error::Pcap(OurPcapError::InvalidFormat {
                reason: format!("Failed to parse PCAPNG header: {e}"),
            })
        })?;

        Ok(Self {
            inner: ReaderInner::Ng(pcap_reader),
            state: ReadState::new(),
        })
    }

    /// Number of packets returned so far.
    pub fn frame_count(&self) -> u64 {
        self.state.frame_number
    }

    /// Read the next packet.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        match &mut self.inner {
            ReaderInner::Legacy(reader) => next_legacy(reader, &mut self.state),
            ReaderInner::Ng(reader) => next_ng(reader, &mut self.state),
        }
    }
}

impl Interface {
    fn new(link_type: u16, tsresol: u8, tsoffset_s: i64) -> Self {
        let units_per_second = units_per_second(tsresol).unwrap_or_else(|| {
            debug!(tsresol, "unsupported if_tsresol, assuming microseconds");
            1_000_000
        });
        Self {
            link_type,
            units_per_second,
            offset_us: tsoffset_s.saturating_mul(1_000_000),
        }
    }

    fn timestamp_us(&self, ts_high: u32, ts_low: u32) -> i64 {
        let units = (u128::from(ts_high) << 32) | u128::from(ts_low);
        let micros = units * 1_000_000 / u128::from(self.units_per_second);
        i64::try_from(micros)
            .unwrap_or(i64::MAX)
            .saturating_add(self.offset_us)
    }
}

/// Ticks per second for a pcapng `if_tsresol` value: a power of ten, or
/// a power of two when the high bit is set.
fn units_per_second(tsresol: u8) -> Option<u64> {
    let exponent = u32::from(tsresol & 0x7f);
    if tsresol & 0x80 == 0 {
        10u64.checked_pow(exponent)
    } else {
        1u64.checked_shl(exponent)
    }
}

impl ReadState {
    fn new() -> Self {
        Self {
            frame_number: 0,
            // Replaced by the file header.
            link_type: LINKTYPE_ETHERNET,
            nanosecond_timestamps: false,
            interfaces: Vec::new(),
        }
    }

    fn packet(
        &mut self,
        timestamp_us: i64,
        caplen: u32,
        origlen: u32,
        link_type: u16,
        data: &[u8],
    ) -> RawPacket {
        self.frame_number += 1;
        RawPacket::new(
            self.frame_number,
            timestamp_us,
            caplen,
            origlen,
            link_type,
            data.to_vec(),
        )
    }

    /// Interface a pcapng packet was captured on; unknown ids get defaults.
    fn interface(&self, if_id: u32) -> Interface {
        usize::try_from(if_id)
            .ok()
            .and_then(|id| self.interfaces.get(id))
            .copied()
            .unwrap_or_else(|| Interface::new(LINKTYPE_ETHERNET, DEFAULT_TSRESOL, 0))
    }
}

fn next_legacy(
    reader: &mut LegacyPcapReader<BufReader<BoxedRead>>,
    state: &mut ReadState,
) -> Result<Option<RawPacket>, Error> {
    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    let fraction = if state.nanosecond_timestamps {
                        i64::from(packet.ts_usec) / 1_000
                    } else {
                        i64::from(packet.ts_usec)
                    };
                    let timestamp_us = i64::from(packet.ts_sec) * 1_000_000 + fraction;
                    let link_type = state.link_type;
                    let raw = state.packet(
                        timestamp_us,
                        packet.caplen,
                        packet.origlen,
                        link_type,
                        packet.data,
                    );

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    state.link_type = header.network.0 as u16;
                    state.nanosecond_timestamps = header.is_nanosecond_precision();
                    debug!(link_type = state.link_type, "pcap header");
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => reader.refill().map_err(refill_error)?,
            Err(e) => return Err(parse_error(e)),
        }
    }
}

fn next_ng(
    reader: &mut PcapNGReader<BufReader<BoxedRead>>,
    state: &mut ReadState,
) -> Result<Option<RawPacket>, Error> {
    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                    // Interface ids are scoped to their section
                    state.interfaces.clear();
                    reader.consume(offset);
                }
                PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                    let interface =
                        Interface::new(idb.linktype.0 as u16, idb.if_tsresol, idb.if_tsoffset);
                    debug!(
                        link_type = interface.link_type,
                        tsresol = idb.if_tsresol,
                        "pcapng interface"
                    );
                    state.interfaces.push(interface);
                    reader.consume(offset);
                }
                PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                    let interface = state.interface(epb.if_id);
                    let timestamp_us = interface.timestamp_us(epb.ts_high, epb.ts_low);
                    let raw = state.packet(
                        timestamp_us,
                        epb.caplen,
                        epb.origlen,
                        interface.link_type,
                        epb.data,
                    );

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                    // No timestamp in simple packets; they belong to interface 0
                    let link_type = state.interface(0).link_type;
                    let raw = state.packet(0, spb.data.len() as u32, spb.origlen, link_type, spb.data);

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => reader.refill().map_err(refill_error)?,
            Err(e) => return Err(parse_error(e)),
        }
    }
}

fn refill_error(e: impl fmt::Display) -> Error {
    Error::Pcap(OurPcapError::InvalidFormat {
        reason: format!("Refill error: {e}"),
    })
}

fn parse_error(e: impl fmt::Display) -> Error {
    Error::Pcap(OurPcapError::InvalidFormat {
        reason: format!("Parse error: {e}"),
    })
}

fn read_magic(reader: &mut BoxedRead) -> Result<[u8; 4], Error> {
    let mut magic = [0u8; 4];
    read_header_bytes(reader, &mut magic)?;
    Ok(magic)
}

/// Read the complete file header (pcap global header, or pcapng section
/// header block) that starts with `magic`.
fn read_file_header(
    reader: &mut BoxedRead,
    magic: [u8; 4],
) -> Result<(CaptureFormat, Vec<u8>), Error> {
    let format = match magic {
        // PCAP, micro- and nanosecond, both byte orders
        [0xd4, 0xc3, 0xb2, 0xa1]
        | [0xa1, 0xb2, 0xc3, 0xd4]
        | [0x4d, 0x3c, 0xb2, 0xa1]
        | [0xa1, 0xb2, 0x3c, 0x4d] => CaptureFormat::Legacy,
        // PCAPNG
        [0x0a, 0x0d, 0x0d, 0x0a] => CaptureFormat::Ng,
        _ => {
            return Err(Error::Pcap(OurPcapError::InvalidFormat {
                reason: format!("Unknown magic number: {magic:02x?}"),
            }))
        }
    };

    let mut header = magic.to_vec();
    match format {
        CaptureFormat::Legacy => extend_header(reader, &mut header, LEGACY_HEADER_LEN)?,
        CaptureFormat::Ng => {
            extend_header(reader, &mut header, NG_BLOCK_PREFIX_LEN)?;
            let block_len = section_header_len(&header)?;
            extend_header(reader, &mut header, block_len)?;
        }
    }
    Ok((format, header))
}

/// Total length of the pcapng section header block whose first
/// [`NG_BLOCK_PREFIX_LEN`] bytes are in `prefix`.
fn section_header_len(prefix: &[u8]) -> Result<usize, Error> {
    let invalid = |reason: String| Error::Pcap(OurPcapError::InvalidFormat { reason });

    let len = [prefix[4], prefix[5], prefix[6], prefix[7]];
    let bom = [prefix[8], prefix[9], prefix[10], prefix[11]];
    let block_len = if u32::from_le_bytes(bom) == NG_BYTE_ORDER_MAGIC {
        u32::from_le_bytes(len)
    } else if u32::from_be_bytes(bom) == NG_BYTE_ORDER_MAGIC {
        u32::from_be_bytes(len)
    } else {
        return Err(invalid(format!("Bad PCAPNG byte-order magic: {bom:02x?}")));
    };

    let block_len = block_len as usize;
    if block_len < NG_MIN_SECTION_HEADER_LEN || block_len > BUFFER_SIZE || block_len % 4 != 0 {
        return Err(invalid(format!("Bad PCAPNG section header length: {block_len}")));
    }
    Ok(block_len)
}

/// Grow `header` to `len` bytes from `reader`.
fn extend_header(reader: &mut BoxedRead, header: &mut Vec<u8>, len: usize) -> Result<(), Error> {
    let start = header.len();
    header.resize(len, 0);
    read_header_bytes(reader, &mut header[start..])
}

fn read_header_bytes(reader: &mut BoxedRead, buf: &mut [u8]) -> Result<(), Error> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Pcap(OurPcapError::InvalidFormat {
            reason: "Input too short to read capture header".to_string(),
        }),
        _ => Error::Io(e),
    })
}

/// Iterator adapter for PcapReader.
impl Iterator for PcapReader {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}
