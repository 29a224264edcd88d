//! I/O directive materialisation
//!
//! Fills each relation's declared load/store directives with defaults: IO
//! type `file`, a filename derived from the relation name, and the
//! configured fact/output directory prefix for relative paths. The
//! sentinel output directory `-` redirects stores to standard output
//! instead.

use crate::ast::Relation;
use crate::ram::IoDirectives;
use crate::translator::Translator;

impl Translator<'_> {
    /// Materialised directives for every declared load of a relation;
    /// a relation without loads gets a single default directive.
    pub(crate) fn input_io_directives(&self, rel: &Relation) -> Vec<IoDirectives> {
        let mut directives: Vec<IoDirectives> = rel
            .loads
            .iter()
            .map(|load| IoDirectives::from_map(load.kvs.clone()))
            .collect();
        if directives.is_empty() {
            directives.push(IoDirectives::new());
        }

        for directive in &mut directives {
            self.make_io_directive(directive, rel, &self.config.fact_dir, ".facts");
        }
        directives
    }

    /// Materialised directives for every declared store of a relation.
    ///
    /// With `output_dir = "-"` the declared directives are discarded:
    /// print-size stores become `stdoutprintsize`, the first ordinary
    /// store becomes `stdout` with headers, and the rest are dropped.
    pub(crate) fn output_io_directives(&self, rel: &Relation) -> Vec<IoDirectives> {
        let mut directives: Vec<IoDirectives> = Vec::new();

        if self.config.stores_to_stdout() {
            let mut has_output = false;
            for store in &rel.stores {
                let mut directive = IoDirectives::new();
                if store.print_size {
                    directive.set("IO", "stdoutprintsize");
                    directives.push(directive);
                } else if !has_output {
                    has_output = true;
                    directive.set("IO", "stdout");
                    directive.set("headers", "true");
                    directives.push(directive);
                }
            }
        } else {
            for store in &rel.stores {
                directives.push(IoDirectives::from_map(store.kvs.clone()));
            }
        }

        if directives.is_empty() {
            directives.push(IoDirectives::new());
        }

        for directive in &mut directives {
            self.make_io_directive(directive, rel, &self.config.output_dir, ".csv");

            if !directive.has("attributeNames") {
                let delimiter = directive.get("delimiter").unwrap_or("\t").to_string();
                let mut names: Vec<&str> =
                    rel.attributes.iter().map(|a| a.name.as_str()).collect();
                if self.config.has_provenance() {
                    let aux_arity = self.analyses.aux_arity.arity_of(&rel.name);
                    names.truncate(names.len().saturating_sub(aux_arity));
                }
                directive.set("attributeNames", names.join(&delimiter));
            }
        }
        directives
    }

    /// Fill one directive's defaults: relation name, IO type `file`, the
    /// default filename, and the directory prefix for relative paths.
    fn make_io_directive(
        &self,
        directive: &mut IoDirectives,
        rel: &Relation,
        directory: &str,
        extension: &str,
    ) {
        directive.set("name", rel.name.clone());
        if !directive.has("IO") {
            directive.set("IO", "file");
        }

        if directive.io_type() == Some("file") {
            if !directive.has("filename") {
                directive.set("filename", format!("{}{extension}", rel.name));
            }
            let filename = directive.get("filename").unwrap_or_default().to_string();
            if !filename.starts_with('/') {
                directive.set("filename", format!("{directory}/{filename}"));
            }
        }
    }
}
