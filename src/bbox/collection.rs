use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bbox::format::{caltech_line, canonical_line, class_line, parse_canonical};
use crate::bbox::Detection;
use crate::geometry::Dims;
use crate::trace::trace_event;
use crate::util::{DetectError, DetectResult};

/// Which files [`BboxCollection::save`] writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SavingFormat {
    /// Nothing is written.
    None,
    /// Every format below.
    All,
    /// `bbox.txt`, one `name h w class conf left top right bottom` line per
    /// box.
    #[default]
    Canonical,
    /// `bbox_caltech/<name>.txt` per group, `left,top,width,height,conf`.
    Caltech,
    /// `bbox_class.txt`, one `name; class` line per box.
    Class,
}

/// Detections of one processed image.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct BboxGroup {
    pub name: String,
    pub dims: Dims,
    pub boxes: Vec<Detection>,
}

/// Ordered groups of detections, one group per image.
///
/// Group names are expected to be unique; lookups return the first match.
#[derive(Clone, Debug, Default)]
pub struct BboxCollection {
    groups: Vec<BboxGroup>,
    format: SavingFormat,
}

impl BboxCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(format: SavingFormat) -> Self {
        Self {
            groups: Vec::new(),
            format,
        }
    }

    pub fn format(&self) -> SavingFormat {
        self.format
    }

    pub fn set_format(&mut self, format: SavingFormat) {
        self.format = format;
    }

    /// Starts a new, empty group and returns it.
    pub fn new_group(&mut self, name: impl Into<String>, dims: Dims) -> &mut BboxGroup {
        self.groups.push(BboxGroup {
            name: name.into(),
            dims,
            boxes: Vec::new(),
        });
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    /// Appends a group holding copies of `boxes`.
    pub fn add_group(&mut self, name: impl Into<String>, dims: Dims, boxes: &[Detection]) {
        self.new_group(name, dims).boxes.extend_from_slice(boxes);
    }

    /// Appends a box to the last group, creating an unnamed group first if
    /// the collection is empty.
    pub fn push(&mut self, detection: Detection, dims: Dims) {
        if self.groups.is_empty() {
            self.new_group("", dims);
        }
        if let Some(group) = self.groups.last_mut() {
            group.boxes.push(detection);
        }
    }

    pub fn groups(&self) -> &[BboxGroup] {
        &self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of boxes across groups.
    pub fn box_count(&self) -> usize {
        self.groups.iter().map(|g| g.boxes.len()).sum()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> DetectResult<&BboxGroup> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| DetectError::UnknownGroup {
                name: name.to_string(),
            })
    }

    /// Boxes of the named group.
    pub fn group_boxes(&self, name: &str) -> DetectResult<&[Detection]> {
        Ok(&self.group(name)?.boxes)
    }

    /// Image dimensions of the named group.
    pub fn group_dims(&self, name: &str) -> DetectResult<Dims> {
        Ok(self.group(name)?.dims)
    }

    /// Summary such as `bboxes (3 boxes in 2 groups)`.
    pub fn describe(&self) -> String {
        format!(
            "bboxes ({} boxes in {} groups)",
            self.box_count(),
            self.groups.len()
        )
    }

    /// Writes the files selected by [`format`](Self::format) into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> DetectResult<()> {
        let dir = dir.as_ref();
        match self.format {
            SavingFormat::None => {}
            SavingFormat::All => {
                self.save_canonical(dir)?;
                self.save_caltech(dir)?;
                self.save_class(dir)?;
            }
            SavingFormat::Canonical => {
                self.save_canonical(dir)?;
            }
            SavingFormat::Caltech => self.save_caltech(dir)?,
            SavingFormat::Class => {
                self.save_class(dir)?;
            }
        }
        Ok(())
    }

    /// Writes the canonical dump to `dir/bbox.txt` and returns its path.
    pub fn save_canonical(&self, dir: impl AsRef<Path>) -> DetectResult<PathBuf> {
        let path = dir.as_ref().join("bbox.txt");
        write_file(&path, |w| self.write_canonical(w))?;
        trace_event!("bboxes_saved", boxes = self.box_count());
        Ok(path)
    }

    /// Writes the canonical dump to `out`.
    ///
    /// Group names may be empty or contain spaces but not line breaks.
    pub fn write_canonical<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for group in &self.groups {
            if group.name.contains(['\n', '\r']) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("group name {:?} contains a line break", group.name),
                ));
            }
            for d in &group.boxes {
                writeln!(out, "{}", canonical_line(&group.name, group.dims, d))?;
            }
        }
        Ok(())
    }

    /// Writes one `left,top,width,height,conf` file per group under
    /// `dir/bbox_caltech/`, mirroring the directory part of the group name.
    pub fn save_caltech(&self, dir: impl AsRef<Path>) -> DetectResult<()> {
        let root = dir.as_ref().join("bbox_caltech");
        for group in &self.groups {
            let name = Path::new(&group.name);
            let stem = name
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let subdir = match name.parent() {
                Some(parent) => root.join(parent),
                None => root.clone(),
            };
            fs::create_dir_all(&subdir).map_err(|err| DetectError::io(&subdir, err))?;
            let path = subdir.join(format!("{stem}.txt"));
            write_file(&path, |w| {
                for d in &group.boxes {
                    writeln!(w, "{}", caltech_line(d))?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Writes `dir/bbox_class.txt` and returns its path.
    pub fn save_class(&self, dir: impl AsRef<Path>) -> DetectResult<PathBuf> {
        let path = dir.as_ref().join("bbox_class.txt");
        write_file(&path, |w| {
            for group in &self.groups {
                for d in &group.boxes {
                    writeln!(w, "{}", class_line(&group.name, d))?;
                }
            }
            Ok(())
        })?;
        Ok(path)
    }

    /// Loads a canonical dump from a file.
    pub fn load_canonical(path: impl AsRef<Path>) -> DetectResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| DetectError::io(path, err))?;
        Self::read_canonical(BufReader::new(file)).map_err(|err| match err {
            DetectError::Io { reason, .. } => DetectError::Io {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parses a canonical dump.
    ///
    /// A new group starts whenever the name differs from the previous
    /// line's. Blank lines are skipped.
    pub fn read_canonical<R: BufRead>(reader: R) -> DetectResult<Self> {
        let mut collection = Self::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| DetectError::Io {
                path: String::from("<reader>"),
                reason: err.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_canonical(i + 1, &line)?;
            let same_group = collection
                .groups
                .last()
                .is_some_and(|g| g.name == record.name);
            if !same_group {
                collection.new_group(record.name, record.dims);
            }
            collection.push(record.detection, record.dims);
        }
        trace_event!("bboxes_loaded", boxes = collection.box_count());
        Ok(collection)
    }
}

impl fmt::Display for BboxCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn write_file<F>(path: &Path, body: F) -> DetectResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file = File::create(path).map_err(|err| DetectError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|err| DetectError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::{BboxCollection, SavingFormat};
    use crate::bbox::Detection;
    use crate::geometry::{Dims, OriginalRect};
    use crate::util::DetectError;

    fn sample() -> BboxCollection {
        let mut c = BboxCollection::new();
        c.add_group(
            "a.png",
            Dims::new(240, 320),
            &[
                Detection::new(1, 0.9, OriginalRect::new(1.0, 2.0, 3.0, 4.0)),
                Detection::new(2, 0.25, OriginalRect::new(5.0, 6.0, 7.0, 8.0)),
            ],
        );
        c.add_group(
            "b.png",
            Dims::new(10, 20),
            &[Detection::new(1, 0.5, OriginalRect::new(0.0, 0.0, 1.0, 1.0))],
        );
        c
    }

    #[test]
    fn describe_counts_boxes_and_groups() {
        let c = sample();
        assert_eq!(c.describe(), "bboxes (3 boxes in 2 groups)");
        assert_eq!(c.to_string(), c.describe());
    }

    #[test]
    fn group_lookup_by_name() {
        let c = sample();
        assert_eq!(c.group_boxes("a.png").unwrap().len(), 2);
        assert_eq!(c.group_dims("b.png").unwrap(), Dims::new(10, 20));
        assert!(matches!(
            c.group("missing"),
            Err(DetectError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn canonical_text_reloads_into_groups() {
        let c = sample();
        let mut buf = Vec::new();
        c.write_canonical(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 3);
        let back = BboxCollection::read_canonical(text.as_bytes()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.groups()[0].name, "a.png");
        assert_eq!(back.groups()[1].boxes[0].class_id, 1);
    }

    #[test]
    fn push_creates_a_group_when_empty() {
        let mut c = BboxCollection::with_format(SavingFormat::None);
        c.push(
            Detection::new(0, 1.0, OriginalRect::new(0.0, 0.0, 1.0, 1.0)),
            Dims::new(4, 4),
        );
        assert_eq!(c.len(), 1);
        assert_eq!(c.box_count(), 1);
    }
}
