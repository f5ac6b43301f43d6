#![allow(dead_code)]

use rusqlite::{Connection, params};
use stairsplus_whitelist::decoder::{DecodeFailure, NodeSet, parse_node_lines};
use std::fs;
use std::path::{Path, PathBuf};

/// Stand-in codec: a block is its node names, one per line. `!` marks a corrupt block.
pub fn lines_decoder(block: &[u8]) -> Result<NodeSet, DecodeFailure> {
    if block.first() == Some(&b'!') {
        return Err(DecodeFailure("corrupt block".to_string()));
    }
    Ok(parse_node_lines(block))
}

pub fn blocks(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

/// A few hundred blocks drawing from a small palette, with stairsplus names sprinkled in.
pub fn sample_map() -> Vec<Vec<u8>> {
    let palette = [
        "air",
        "default:stone",
        "default:dirt",
        "moreblocks:slab_wood",
        "stairs:stair_wood",
        "default:water_source",
        "moreblocks:panel_stone_1",
        "stairs:slab_stone",
    ];
    (0..257)
        .map(|i| {
            let a = palette[i % palette.len()];
            let b = palette[(i * 7 + 3) % palette.len()];
            format!("{}\n{}\nair", a, b).into_bytes()
        })
        .collect()
}

pub const SAMPLE_DUMP: &str = r#"{
    "shaped_nodes": {
        "moreblocks:slab_wood": {"node": "default:wood", "shape": "slab"},
        "moreblocks:slab_stone": {"node": "default:stone", "shape": "slab"},
        "moreblocks:stair_wood": {"node": "default:wood", "shape": "stair"},
        "moreblocks:panel_stone_1": {"node": "default:stone", "shape": "panel"},
        "moreblocks:micro_wood": {"node": "default:wood", "shape": "micro"}
    },
    "aliases": {
        "stairs:stair_wood": "moreblocks:stair_wood",
        "stairs:slab_stone": "moreblocks:slab_stone",
        "stairs:slab_glass": "moreblocks:slab_glass"
    }
}"#;

pub const SAMPLE_EXPECTED: &str =
    "moreblocks:panel_stone_1\nmoreblocks:slab_stone\nmoreblocks:slab_wood\nmoreblocks:stair_wood";

pub fn write_dump(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("stairsplus_dump.json");
    fs::write(&path, contents).unwrap();
    path
}

pub fn write_sqlite_map(path: &Path, rows: &[Vec<u8>]) {
    let mut conn = Connection::open(path).unwrap();
    conn.execute_batch("CREATE TABLE blocks (pos INT PRIMARY KEY, data BLOB)").unwrap();
    let tx = conn.transaction().unwrap();
    for (pos, data) in rows.iter().enumerate() {
        tx.execute(
            "INSERT INTO blocks (pos, data) VALUES (?1, ?2)",
            params![pos as i64, data],
        )
        .unwrap();
    }
    tx.commit().unwrap();
}
