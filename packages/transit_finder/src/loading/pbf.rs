//! Decodes OSM PBF data into MapNode, MapWay and MapRelation primitives,
//! passing each one to a MapHandler in the order it appears in the file.
//!
//! Ids, coordinates, way refs and relation members are all delta encoded,
//! so every list is decoded sequentially against a running total which is
//! reset at the start of each entity. Strings are interned for the lifetime
//! of a single PbfDecoder, so that repeated tag keys and values share one
//! allocation.

use crate::loading::osm_format::{
    Blob, BlobHeader, DenseNodes, HeaderBlock, MemberType, Node,
    PrimitiveBlock, Relation, Way,
};
use crate::loading::structs::{
    MapHandler, MapMember, MapNode, MapRelation, MapTag, MapWay, MemberKind,
};
use flate2::read::ZlibDecoder;
use log::debug;
use prost::Message;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Required features which this decoder knows how to handle
const SUPPORTED_FEATURES: [&str; 2] = ["OsmSchema-V0.6", "DenseNodes"];

const MAX_HEADER_SIZE: usize = 64 * 1024;
const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;
const DEFAULT_GRANULARITY: i32 = 100;

/// Errors which abort an import. No partially built graph should be used
/// once one of these has been returned
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported required feature '{feature}'")]
    UnsupportedFeature { feature: String },
    #[error("relation {relation} has a member of unknown type {value}")]
    UnknownMemberType { relation: i64, value: i32 },
    #[error("string table index {index} is out of range ({len} strings)")]
    StringIndex { index: usize, len: usize },
    #[error("{entity} {id} has mismatched {field} lengths")]
    MismatchedLengths {
        entity: &'static str,
        id: i64,
        field: &'static str,
    },
    #[error("blob header of {size} bytes exceeds the maximum")]
    HeaderTooLarge { size: usize },
    #[error("blob of {size} bytes exceeds the maximum")]
    BlobTooLarge { size: i64 },
    #[error("blob inflates to more than {limit} bytes")]
    InflatedTooLarge { limit: usize },
    #[error("blob inflated to {actual} bytes, expected {expected}")]
    InflatedSize { expected: i32, actual: usize },
    #[error("string table entry {index} is not valid UTF-8")]
    InvalidString { index: usize },
    #[error("{entity} {id} overflows while decoding {field}")]
    Overflow {
        entity: &'static str,
        id: i64,
        field: &'static str,
    },
    #[error("file ended part way through a frame")]
    TruncatedFrame,
    #[error("blob contains no data")]
    EmptyBlob,
    #[error("failed to decode protobuf message")]
    Protobuf(#[from] prost::DecodeError),
    #[error("failed to read PBF data")]
    Io(#[from] std::io::Error),
    #[error("failed to open PBF file at {path:?}")]
    Open {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Deduplicates strings for the lifetime of a single decode session
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: FxHashSet<Arc<str>>,
}

impl StringInterner {
    /// Fetch the shared copy of the provided string, creating it if this is
    /// the first time it has been seen
    pub fn intern(&mut self, value: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(value) {
            return existing.clone();
        }
        let interned: Arc<str> = Arc::from(value);
        self.strings.insert(interned.clone());
        interned
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Converts the scaled integer coordinates of a block into degrees
#[derive(Debug, Clone, Copy)]
struct BlockCoordinates {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl BlockCoordinates {
    fn new(block: &PrimitiveBlock) -> Self {
        BlockCoordinates {
            granularity: block.granularity.unwrap_or(DEFAULT_GRANULARITY)
                as i64,
            lat_offset: block.lat_offset.unwrap_or(0),
            lon_offset: block.lon_offset.unwrap_or(0),
        }
    }

    fn degrees(&self, offset: i64, raw: i64) -> Option<f64> {
        let nanos = self.granularity.checked_mul(raw)?.checked_add(offset)?;
        Some(1e-9 * nanos as f64)
    }

    /// Latitude and longitude of a node, in degrees
    fn position(
        &self,
        id: i64,
        raw_lat: i64,
        raw_lon: i64,
    ) -> Result<(f64, f64), DecodeError> {
        let overflow = |field| DecodeError::Overflow {
            entity: "node",
            id,
            field,
        };
        let lat = self
            .degrees(self.lat_offset, raw_lat)
            .ok_or_else(|| overflow("lat"))?;
        let lon = self
            .degrees(self.lon_offset, raw_lon)
            .ok_or_else(|| overflow("lon"))?;
        Ok((lat, lon))
    }
}

/// Add the next delta to a running total
fn accumulate(
    total: i64,
    delta: i64,
    entity: &'static str,
    id: i64,
    field: &'static str,
) -> Result<i64, DecodeError> {
    total
        .checked_add(delta)
        .ok_or(DecodeError::Overflow { entity, id, field })
}

/// Fetch a string from the block's string table
fn string_at(
    table: &[Arc<str>],
    index: usize,
) -> Result<Arc<str>, DecodeError> {
    table.get(index).cloned().ok_or(DecodeError::StringIndex {
        index,
        len: table.len(),
    })
}

/// Pair up parallel key and value index arrays into tags
fn build_tags(
    table: &[Arc<str>],
    keys: &[u32],
    vals: &[u32],
    entity: &'static str,
    id: i64,
) -> Result<Vec<MapTag>, DecodeError> {
    if keys.len() != vals.len() {
        return Err(DecodeError::MismatchedLengths {
            entity,
            id,
            field: "key/value",
        });
    }
    keys.iter()
        .zip(vals.iter())
        .map(|(key, val)| {
            Ok(MapTag {
                key: string_at(table, *key as usize)?,
                value: string_at(table, *val as usize)?,
            })
        })
        .collect()
}

/// A single decode session. The interned strings are owned by the decoder
/// and dropped along with it, so separate imports never share them.
pub struct PbfDecoder<H: MapHandler> {
    handler: H,
    strings: StringInterner,
    parse_nodes: bool,
    parse_ways: bool,
    parse_relations: bool,
}

impl<H: MapHandler> PbfDecoder<H> {
    /// Create a new decoder which emits every primitive type
    pub fn new(handler: H) -> Self {
        PbfDecoder {
            handler,
            strings: StringInterner::default(),
            parse_nodes: true,
            parse_ways: true,
            parse_relations: true,
        }
    }

    /// Restrict which primitive types are emitted. This allows a file to be
    /// read in several passes, e.g. relations first so that the ways they
    /// reference can be identified
    pub fn with_phases(
        mut self,
        parse_nodes: bool,
        parse_ways: bool,
        parse_relations: bool,
    ) -> Self {
        self.parse_nodes = parse_nodes;
        self.parse_ways = parse_ways;
        self.parse_relations = parse_relations;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn strings(&self) -> &StringInterner {
        &self.strings
    }

    /// End the session, discarding the string table
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Read a complete PBF file from disk
    pub fn read_file(&mut self, path: &Path) -> Result<(), DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            source,
            path: path.to_path_buf(),
        })?;
        self.read_from(BufReader::new(file))
    }

    /// Read every frame from the provided reader until it is exhausted
    pub fn read_from<R: Read>(
        &mut self,
        mut reader: R,
    ) -> Result<(), DecodeError> {
        while let Some((kind, data)) = read_frame(&mut reader)? {
            match kind.as_str() {
                "OSMHeader" => {
                    let header = HeaderBlock::decode(data.as_slice())?;
                    self.decode_header(&header)?;
                }
                "OSMData" => {
                    let block = PrimitiveBlock::decode(data.as_slice())?;
                    self.decode_block(&block)?;
                }
                other => debug!("Skipping blob of unknown type '{other}'"),
            }
        }
        Ok(())
    }

    /// Check that every feature the file requires is understood
    pub fn decode_header(
        &mut self,
        header: &HeaderBlock,
    ) -> Result<(), DecodeError> {
        for feature in header.required_features.iter() {
            if !SUPPORTED_FEATURES.contains(&feature.as_str()) {
                return Err(DecodeError::UnsupportedFeature {
                    feature: feature.clone(),
                });
            }
        }
        if let Some(program) = &header.writingprogram {
            debug!("Reading PBF data written by {program}");
        }
        Ok(())
    }

    /// Decode every primitive group in a block, emitting primitives in the
    /// order they are stored
    pub fn decode_block(
        &mut self,
        block: &PrimitiveBlock,
    ) -> Result<(), DecodeError> {
        let table = block
            .stringtable
            .s
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                let value = std::str::from_utf8(bytes)
                    .map_err(|_| DecodeError::InvalidString { index })?;
                Ok(self.strings.intern(value))
            })
            .collect::<Result<Vec<Arc<str>>, DecodeError>>()?;
        let coords = BlockCoordinates::new(block);

        for group in block.primitivegroup.iter() {
            if self.parse_nodes {
                for node in group.nodes.iter() {
                    self.decode_node(&table, &coords, node)?;
                }
                if let Some(dense) = &group.dense {
                    self.decode_dense(&table, &coords, dense)?;
                }
            }
            if self.parse_ways {
                for way in group.ways.iter() {
                    self.decode_way(&table, way)?;
                }
            }
            if self.parse_relations {
                for relation in group.relations.iter() {
                    self.decode_relation(&table, relation)?;
                }
            }
        }
        Ok(())
    }

    fn decode_node(
        &mut self,
        table: &[Arc<str>],
        coords: &BlockCoordinates,
        node: &Node,
    ) -> Result<(), DecodeError> {
        let tags = build_tags(table, &node.keys, &node.vals, "node", node.id)?;
        let (lat, lon) = coords.position(node.id, node.lat, node.lon)?;
        self.handler.add_node(MapNode {
            id: node.id,
            lat,
            lon,
            tags,
        });
        Ok(())
    }

    fn decode_dense(
        &mut self,
        table: &[Arc<str>],
        coords: &BlockCoordinates,
        dense: &DenseNodes,
    ) -> Result<(), DecodeError> {
        let count = dense.id.len();
        if dense.lat.len() != count || dense.lon.len() != count {
            return Err(DecodeError::MismatchedLengths {
                entity: "dense node group starting at",
                id: dense.id.first().copied().unwrap_or_default(),
                field: "id/lat/lon",
            });
        }

        // Running totals, each value is stored relative to the previous node
        let mut id = 0_i64;
        let mut lat = 0_i64;
        let mut lon = 0_i64;

        // An empty keys_vals array means no node in the group has tags
        let has_tags = !dense.keys_vals.is_empty();
        let mut keys_vals = dense.keys_vals.iter();

        for inx in 0..count {
            let entity = "dense node";
            id = accumulate(id, dense.id[inx], entity, id, "id")?;
            lat = accumulate(lat, dense.lat[inx], entity, id, "lat")?;
            lon = accumulate(lon, dense.lon[inx], entity, id, "lon")?;

            let mut tags = Vec::new();
            if has_tags {
                loop {
                    let key = match keys_vals.next() {
                        None | Some(0) => break,
                        Some(key) => *key as usize,
                    };
                    let value = match keys_vals.next() {
                        Some(value) => *value as usize,
                        None => {
                            return Err(DecodeError::MismatchedLengths {
                                entity: "node",
                                id,
                                field: "key/value",
                            });
                        }
                    };
                    tags.push(MapTag {
                        key: string_at(table, key)?,
                        value: string_at(table, value)?,
                    });
                }
            }

            let (node_lat, node_lon) = coords.position(id, lat, lon)?;
            self.handler.add_node(MapNode {
                id,
                lat: node_lat,
                lon: node_lon,
                tags,
            });
        }
        Ok(())
    }

    fn decode_way(
        &mut self,
        table: &[Arc<str>],
        way: &Way,
    ) -> Result<(), DecodeError> {
        let tags = build_tags(table, &way.keys, &way.vals, "way", way.id)?;

        let mut node_id = 0_i64;
        let refs = way
            .refs
            .iter()
            .map(|delta| {
                node_id = accumulate(node_id, *delta, "way", way.id, "refs")?;
                Ok(node_id)
            })
            .collect::<Result<Vec<i64>, DecodeError>>()?;

        self.handler.add_way(MapWay {
            id: way.id,
            refs,
            tags,
        });
        Ok(())
    }

    fn decode_relation(
        &mut self,
        table: &[Arc<str>],
        relation: &Relation,
    ) -> Result<(), DecodeError> {
        let tags = build_tags(
            table,
            &relation.keys,
            &relation.vals,
            "relation",
            relation.id,
        )?;

        let count = relation.memids.len();
        if relation.types.len() != count || relation.roles_sid.len() != count
        {
            return Err(DecodeError::MismatchedLengths {
                entity: "relation",
                id: relation.id,
                field: "member",
            });
        }

        let mut member_id = 0_i64;
        let mut members = Vec::with_capacity(count);
        for inx in 0..count {
            member_id = accumulate(
                member_id,
                relation.memids[inx],
                "relation",
                relation.id,
                "members",
            )?;

            let raw_type = relation.types[inx];
            let kind = match MemberType::try_from(raw_type) {
                Ok(MemberType::Node) => MemberKind::Node,
                Ok(MemberType::Way) => MemberKind::Way,
                Ok(MemberType::Relation) => MemberKind::Relation,
                Err(_) => {
                    return Err(DecodeError::UnknownMemberType {
                        relation: relation.id,
                        value: raw_type,
                    });
                }
            };

            members.push(MapMember {
                kind,
                reference: member_id,
                role: string_at(table, relation.roles_sid[inx] as usize)?,
            });
        }

        self.handler.add_relation(MapRelation {
            id: relation.id,
            members,
            tags,
        });
        Ok(())
    }
}

// Framing --------------------------------------------------------------------

/// Fill the buffer, returning false if the reader was already exhausted.
/// Running out of data part way through is an error.
fn fill_or_eof<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<bool, DecodeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(DecodeError::TruncatedFrame),
            Ok(read) => filled += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

fn read_exact_frame<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), DecodeError> {
    match fill_or_eof(reader, buf)? {
        true => Ok(()),
        false if buf.is_empty() => Ok(()),
        false => Err(DecodeError::TruncatedFrame),
    }
}

/// Read the next frame, returning the blob type and its inflated contents
fn read_frame<R: Read>(
    reader: &mut R,
) -> Result<Option<(String, Vec<u8>)>, DecodeError> {
    let mut len_buf = [0_u8; 4];
    if !fill_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }

    let header_size = u32::from_be_bytes(len_buf) as usize;
    if header_size > MAX_HEADER_SIZE {
        return Err(DecodeError::HeaderTooLarge { size: header_size });
    }
    let mut header_buf = vec![0_u8; header_size];
    read_exact_frame(reader, &mut header_buf)?;
    let header = BlobHeader::decode(header_buf.as_slice())?;

    let blob_size = header.datasize as i64;
    if blob_size < 0 || blob_size > MAX_BLOB_SIZE as i64 {
        return Err(DecodeError::BlobTooLarge { size: blob_size });
    }
    let mut blob_buf = vec![0_u8; blob_size as usize];
    read_exact_frame(reader, &mut blob_buf)?;
    let blob = Blob::decode(blob_buf.as_slice())?;

    Ok(Some((header.r#type, inflate(blob)?)))
}

/// Retrieve the contents of a blob, decompressing if required
fn inflate(blob: Blob) -> Result<Vec<u8>, DecodeError> {
    if let Some(raw) = blob.raw {
        return Ok(raw);
    }
    match blob.zlib_data {
        Some(compressed) => {
            let capacity = blob.raw_size.unwrap_or(0).max(0) as usize;
            let mut data = Vec::with_capacity(capacity.min(MAX_BLOB_SIZE));
            ZlibDecoder::new(compressed.as_slice())
                .take(MAX_BLOB_SIZE as u64 + 1)
                .read_to_end(&mut data)?;
            if data.len() > MAX_BLOB_SIZE {
                return Err(DecodeError::InflatedTooLarge {
                    limit: MAX_BLOB_SIZE,
                });
            }
            match blob.raw_size {
                Some(expected) if expected as i64 != data.len() as i64 => {
                    Err(DecodeError::InflatedSize {
                        expected,
                        actual: data.len(),
                    })
                }
                _ => Ok(data),
            }
        }
        None => Err(DecodeError::EmptyBlob),
    }
}
