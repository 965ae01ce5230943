// Source map helpers - line maps for transformed modules and stitching for bundles

use crate::utils::{LinkerError, Result};
use sourcemap::{SourceMap, SourceMapBuilder};

fn map_error(err: sourcemap::Error) -> LinkerError {
    LinkerError::config(format!("invalid source map: {}", err))
}

fn serialize(map: &SourceMap) -> Result<String> {
    let mut buffer = Vec::new();
    map.to_writer(&mut buffer).map_err(map_error)?;
    String::from_utf8(buffer).map_err(|e| LinkerError::config(format!("invalid source map: {}", e)))
}

/// Count newline characters
pub fn newlines(source: &str) -> u32 {
    source.bytes().filter(|b| *b == b'\n').count() as u32
}

/// Generate source map comment for external file
pub fn external_comment(map_file_name: &str) -> String {
    format!("//# sourceMappingURL={}", map_file_name)
}

/// Build a map where generated line `offset + i` is original line `i`.
///
/// Used for transformed modules, whose edits never move code across lines.
pub fn line_map(source_name: &str, source_content: &str, offset: u32) -> Result<String> {
    let mut builder = SourceMapBuilder::new(None);
    let src_id = builder.add_source(source_name);
    builder.set_source_contents(src_id, Some(source_content));

    let lines = newlines(source_content) + 1;
    for line in 0..lines {
        builder.add(offset + line, 0, line, 0, Some(source_name), None, false);
    }

    serialize(&builder.into_sourcemap())
}

/// Shift every generated position of `map_json` down by `lines`
pub fn offset_map(map_json: &str, lines: u32) -> Result<String> {
    let map = SourceMap::from_slice(map_json.as_bytes()).map_err(map_error)?;
    let mut stitcher = MapStitcher::new(map.get_file());
    stitcher.add_map(&map, lines, None);
    stitcher.finish_string()
}

/// Concatenates per-module maps into the map of one assembled file
pub struct MapStitcher {
    builder: SourceMapBuilder,
}

impl MapStitcher {
    pub fn new(file: Option<&str>) -> Self {
        Self {
            builder: SourceMapBuilder::new(file),
        }
    }

    /// Splice a module map at `line_offset`, optionally renaming its sources
    pub fn add_module(&mut self, map_json: &str, line_offset: u32, source_name: Option<&str>) -> Result<()> {
        let map = SourceMap::from_slice(map_json.as_bytes()).map_err(map_error)?;
        self.add_map(&map, line_offset, source_name);
        Ok(())
    }

    fn add_map(&mut self, map: &SourceMap, line_offset: u32, source_name: Option<&str>) {
        for src_id in 0..map.get_source_count() {
            let name = source_name.or_else(|| map.get_source(src_id));
            if let Some(name) = name {
                let id = self.builder.add_source(name);
                self.builder.set_source_contents(id, map.get_source_contents(src_id));
            }
        }

        for token in map.tokens() {
            let source = if token.has_source() {
                source_name.or_else(|| token.get_source())
            } else {
                None
            };
            self.builder.add(
                token.get_dst_line() + line_offset,
                token.get_dst_col(),
                token.get_src_line(),
                token.get_src_col(),
                source,
                token.get_name(),
                false,
            );
        }
    }

    pub fn finish_string(self) -> Result<String> {
        serialize(&self.builder.into_sourcemap())
    }

    pub fn finish(self) -> Result<serde_json::Value> {
        let json = self.finish_string()?;
        Ok(serde_json::from_str(&json)?)
    }
}
