//! Per-file counts of solved qualifiers.

use std::fmt::Write as _;

use serde::Serialize;

use crate::program::ProgramInfo;
use crate::qual::Qualifier;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub file: String,
    /// Solver slots owned by declarations in the file.
    pub constraints: usize,
    pub ptr: usize,
    pub ntarr: usize,
    pub arr: usize,
    pub wild: usize,
}

impl FileStats {
    fn add(&mut self, q: Qualifier) {
        self.constraints += 1;
        match q {
            Qualifier::Ptr => self.ptr += 1,
            Qualifier::NtArr => self.ntarr += 1,
            Qualifier::Arr => self.arr += 1,
            Qualifier::Wild => self.wild += 1,
        }
    }

    fn absorb(&mut self, other: &FileStats) {
        self.constraints += other.constraints;
        self.ptr += other.ptr;
        self.ntarr += other.ntarr;
        self.arr += other.arr;
        self.wild += other.wild;
    }
}

/// The options that shaped a run, shown above the table in verbose mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub merge_multiple_func_decls: bool,
    pub handle_varargs: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    pub files: Vec<FileStats>,
    pub summary: FileStats,
}

impl Stats {
    pub fn compute(info: &ProgramInfo) -> Stats {
        let cs = info.constraints();
        let mut summary = FileStats {
            file: "Summary".to_string(),
            ..FileStats::default()
        };
        let files = info
            .slots_by_file()
            .into_iter()
            .map(|(file, slots)| {
                let mut fs = FileStats {
                    file,
                    ..FileStats::default()
                };
                for v in slots {
                    fs.add(cs.assignment(v));
                }
                summary.absorb(&fs);
                fs
            })
            .collect();
        let opts = info.options();
        let settings = opts.verbose.then(|| Settings {
            merge_multiple_func_decls: !opts.separate_multiple_func_decls,
            handle_varargs: opts.handle_varargs,
        });
        Stats {
            settings,
            files,
            summary,
        }
    }

    /// Pipe-separated table with a header and a trailing summary row,
    /// preceded by the run's settings in verbose mode.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(settings) = &self.settings {
            let _ = writeln!(
                out,
                "merge multiple function declarations: {}",
                settings.merge_multiple_func_decls
            );
            let _ = writeln!(out, "handle varargs: {}", settings.handle_varargs);
        }
        out.push_str("file|#constraints|#ptr|#ntarr|#arr|#wild\n");
        for fs in self.files.iter().chain(Some(&self.summary)) {
            let _ = writeln!(
                out,
                "{}|{}|{}|{}|{}|{}",
                fs.file, fs.constraints, fs.ptr, fs.ntarr, fs.arr, fs.wild
            );
        }
        out
    }
}
