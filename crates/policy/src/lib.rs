//! # Information-flow policy compiler
//!
//! **Role**: Compiles a declarative policy file (tag topologies, perimeter
//! guards, `aware` declarations) into a [`Policy`]: one master DAG over
//! every declared tag, a dense least-common-ancestor matrix, and resolved
//! perimeter-guard entries.
//!
//! **Pipeline**: lex → parse → AST → topology algebra → DAG check → LCA.
//! Simple topologies (basic, linear) compile first; expression topologies
//! combine them by disjoint union (`+`) and Cartesian product (`*`); every
//! compiled topology is then disjoint-unioned into the master, the
//! distinguished `unknown` tag is inserted at index 0, and the LCA matrix
//! is solved over the resulting partial order.
//!
//! All entities are built once during load and immutable afterward.

pub mod ast;
pub mod lca;
pub mod lexer;
pub mod parser;
pub mod topology;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use ast::{BinOp, Decl, Expr, Source, TopologyDecl};
use thiserror::Error;
use topology::{canonical, BasicTopology, LinearTopology};

/// Errors from policy loading and compilation. All are fatal.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] io::Error),
    #[error("policy lex error: {0}")]
    Lex(#[from] lexer::LexError),
    #[error("policy parse error: {0}")]
    Parse(#[from] parser::ParseError),
    #[error("topology '{0}' cannot be declared twice")]
    DuplicateTopology(String),
    #[error("unknown topology '{0}'")]
    UnknownTopology(String),
    #[error("the policy is not a directed acyclic graph")]
    NotADag,
    #[error("the policy is too big: {0} tags found, but only 256 fit in a tag byte")]
    TooManyTags(usize),
    #[error("unknown tag '{tag}' for perimeter guard '{guard}'")]
    UnknownPgTag { guard: String, tag: String },
}

/// A named binding of an I/O endpoint to a tag index, classifying data
/// that crosses the program boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerimeterGuard {
    pub name: String,
    pub file: String,
    pub tag: u8,
}

/// A parsed `aware` declaration. Adjacency emission for these is not
/// implemented; the declarations are surfaced here for future stages.
#[derive(Debug, Clone)]
pub struct Aware {
    pub name: String,
    pub topology: TopologyDecl,
}

/// A compiled policy: the master topology, its tag set, the LCA matrix,
/// and the perimeter guards, in the state the emitter consumes.
#[derive(Debug)]
pub struct Policy {
    topology: BasicTopology,
    topologies: Vec<BasicTopology>,
    tags: HashSet<String>,
    lca: Vec<Vec<u8>>,
    perimeter_guards: Vec<PerimeterGuard>,
    awares: Vec<Aware>,
}

impl Policy {
    /// Reads and compiles a policy file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = fs::read_to_string(path)?;
        Self::compile(&text)
    }

    /// Compiles policy source text.
    ///
    /// # Errors
    /// Any [`PolicyError`]: lexical and syntax errors, duplicate or unknown
    /// topology names, a cyclic master topology, an unknown perimeter-guard
    /// tag, or more than 256 tags.
    pub fn compile(text: &str) -> Result<Self, PolicyError> {
        let tokens = lexer::lex(text)?;
        let tree = parser::parse(&tokens)?;
        Self::from_ast(&ast::build(&tree))
    }

    fn from_ast(source: &Source) -> Result<Self, PolicyError> {
        // Pass 1: compile simple topologies (basic and linear) in
        // declaration order. Linear chains are coerced to basic here; the
        // matrix form is all the algebra needs.
        let mut names: HashMap<String, usize> = HashMap::new();
        let mut compiled: Vec<BasicTopology> = Vec::new();
        for decl in &source.decls {
            let Decl::Topology(topo) = decl else {
                continue;
            };
            match topo {
                TopologyDecl::Basic { name, edges } => {
                    register(&mut names, &mut compiled, BasicTopology::from_edges(name, edges))?;
                }
                TopologyDecl::Linear { name, tags } => {
                    let mut linear = LinearTopology::new(name);
                    for tag in tags {
                        linear.push_tag(tag);
                    }
                    register(&mut names, &mut compiled, BasicTopology::from_linear(&linear))?;
                }
                TopologyDecl::Expr { .. } => {}
            }
        }

        // Pass 2: expression topologies, in declaration order. Each may
        // reference any simple topology or an earlier expression topology.
        for decl in &source.decls {
            let Decl::Topology(TopologyDecl::Expr { name, expr }) = decl else {
                continue;
            };
            if names.contains_key(name) {
                return Err(PolicyError::DuplicateTopology(name.clone()));
            }
            let mut topology = eval_expr(expr, &names, &compiled)?;
            topology.apply_name_prefix(name);
            register(&mut names, &mut compiled, topology)?;
        }

        // Master assembly: union everything, then let `unknown` dominate.
        let mut master = BasicTopology::new("total");
        let mut tags: HashSet<String> = HashSet::new();
        for topology in &compiled {
            tags.extend(topology.vertex_names().iter().cloned());
            master = BasicTopology::disjoint_union(&master, topology);
        }
        tags.insert("unknown".to_string());
        master.add_unknown();

        if !master.is_acyclic() {
            return Err(PolicyError::NotADag);
        }

        let mut guards: Vec<(String, String, usize)> = Vec::new();
        let mut awares: Vec<Aware> = Vec::new();
        for decl in &source.decls {
            match decl {
                Decl::PerimeterGuard { name, file, tag } => {
                    let index = master.index_of(tag).ok_or_else(|| PolicyError::UnknownPgTag {
                        guard: name.clone(),
                        tag: tag.clone(),
                    })?;
                    guards.push((name.clone(), file.clone(), index));
                }
                Decl::Aware { name, topology } => awares.push(Aware {
                    name: name.clone(),
                    topology: topology.clone(),
                }),
                Decl::Topology(_) => {}
            }
        }

        let wide = lca::compute_lca(master.matrix());
        if wide.len() > 256 {
            return Err(PolicyError::TooManyTags(wide.len()));
        }
        let lca = wide
            .into_iter()
            .map(|row| row.into_iter().map(|v| v as u8).collect())
            .collect();
        let perimeter_guards = guards
            .into_iter()
            .map(|(name, file, index)| PerimeterGuard {
                name,
                file,
                tag: index as u8,
            })
            .collect();

        Ok(Self {
            topology: master,
            topologies: compiled,
            tags,
            lca,
            perimeter_guards,
            awares,
        })
    }

    /// The master topology over every declared tag plus `unknown`.
    pub fn topology(&self) -> &BasicTopology {
        &self.topology
    }

    /// The individually compiled topologies, in compilation order.
    pub fn topologies(&self) -> &[BasicTopology] {
        &self.topologies
    }

    /// Whether `tag` (canonicalized) names a vertex of this policy.
    pub fn contains_tag(&self, tag: &str) -> bool {
        self.tags.contains(&canonical(tag))
    }

    /// Master-topology index of `tag`, one byte per the artifact format.
    pub fn tag_index(&self, tag: &str) -> Option<u8> {
        self.topology.index_of(tag).map(|index| index as u8)
    }

    pub fn lca_matrix(&self) -> &[Vec<u8>] {
        &self.lca
    }

    pub fn perimeter_guards(&self) -> &[PerimeterGuard] {
        &self.perimeter_guards
    }

    pub fn awares(&self) -> &[Aware] {
        &self.awares
    }

    /// Writes the policy artifact header: the `<N> <P>` line, one LCA row
    /// per tag, and one line per perimeter guard.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} {}",
            self.topology.size(),
            self.perimeter_guards.len()
        )?;
        for (i, row) in self.lca.iter().enumerate() {
            write!(out, "{}", self.topology.tag_at(i))?;
            for value in row {
                write!(out, " {value}")?;
            }
            writeln!(out)?;
        }
        for pg in &self.perimeter_guards {
            writeln!(out, "{} \"{}\" {}", pg.name, pg.file, pg.tag)?;
        }
        Ok(())
    }
}

fn register(
    names: &mut HashMap<String, usize>,
    compiled: &mut Vec<BasicTopology>,
    topology: BasicTopology,
) -> Result<(), PolicyError> {
    if names.contains_key(topology.name()) {
        return Err(PolicyError::DuplicateTopology(topology.name().to_string()));
    }
    names.insert(topology.name().to_string(), compiled.len());
    compiled.push(topology);
    Ok(())
}

/// Reduces an expression tree to a basic topology. Referenced topologies
/// are cloned on use, so an expression never mutates what it names.
fn eval_expr(
    expr: &Expr,
    names: &HashMap<String, usize>,
    compiled: &[BasicTopology],
) -> Result<BasicTopology, PolicyError> {
    match expr {
        Expr::Tag(name) => names
            .get(name)
            .map(|&index| compiled[index].clone())
            .ok_or_else(|| PolicyError::UnknownTopology(name.clone())),
        Expr::Bin { op, lhs, rhs } => {
            let left = eval_expr(lhs, names, compiled)?;
            let right = eval_expr(rhs, names, compiled)?;
            Ok(match op {
                BinOp::Add => BasicTopology::disjoint_union(&left, &right),
                BinOp::Mul => BasicTopology::cartesian_product(&left, &right),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_becomes_chain() {
        let policy = Policy::compile("topology PP: linear \"A\",\"B\",\"C\"").unwrap();
        let topology = policy.topology();
        assert_eq!(topology.size(), 4);
        assert_eq!(topology.tag_at(0), "unknown");
        assert_eq!(
            topology.vertex_names(),
            &["unknown", "PP.A", "PP.B", "PP.C"]
        );
        let lca = policy.lca_matrix();
        let idx = |tag: &str| policy.tag_index(tag).unwrap() as usize;
        assert_eq!(lca[idx("PP.B")][idx("PP.C")] as usize, idx("PP.B"));
        assert_eq!(lca[idx("PP.A")][idx("PP.C")] as usize, idx("PP.A"));
        assert_eq!(lca[idx("unknown")][idx("PP.A")] as usize, idx("unknown"));
    }

    #[test]
    fn test_basic_diamond() {
        let policy = Policy::compile(
            "topology D: basic { \"a\"->\"b\", \"a\"->\"c\", \"b\"->\"d\", \"c\"->\"d\" }",
        )
        .unwrap();
        let lca = policy.lca_matrix();
        let idx = |tag: &str| policy.tag_index(tag).unwrap() as usize;
        assert_eq!(lca[idx("D.b")][idx("D.c")] as usize, idx("D.a"));
        assert_eq!(lca[idx("D.b")][idx("D.d")] as usize, idx("D.b"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = Policy::compile("topology C: basic { \"a\"->\"b\", \"b\"->\"a\" }").unwrap_err();
        assert!(matches!(err, PolicyError::NotADag));
    }

    #[test]
    fn test_expression_product_vertices() {
        let policy = Policy::compile(
            "topology L: linear \"x\",\"y\"\n\
             topology R: linear \"p\",\"q\"\n\
             topology T: expr L * R",
        )
        .unwrap();
        for vertex in ["T.(L.x,R.p)", "T.(L.x,R.q)", "T.(L.y,R.p)", "T.(L.y,R.q)"] {
            assert!(policy.contains_tag(vertex), "missing product vertex {vertex}");
        }
        // The operands stay in the master as their own components.
        assert!(policy.contains_tag("L.x"));
        assert!(policy.contains_tag("R.q"));
        // 1 unknown + 2 + 2 + 4 product vertices.
        assert_eq!(policy.topology().size(), 9);

        // Product edges are exactly A ⊗ I | I ⊗ B.
        let m = policy.topology().matrix();
        let idx = |tag: &str| policy.tag_index(tag).unwrap() as usize;
        assert_eq!(m[idx("T.(L.x,R.p)")][idx("T.(L.y,R.p)")], 1);
        assert_eq!(m[idx("T.(L.x,R.q)")][idx("T.(L.y,R.q)")], 1);
        assert_eq!(m[idx("T.(L.x,R.p)")][idx("T.(L.x,R.q)")], 1);
        assert_eq!(m[idx("T.(L.y,R.p)")][idx("T.(L.y,R.q)")], 1);
        assert_eq!(m[idx("T.(L.x,R.p)")][idx("T.(L.y,R.q)")], 0);
        assert_eq!(m[idx("T.(L.x,R.q)")][idx("T.(L.y,R.p)")], 0);
    }

    #[test]
    fn test_expression_sum_references_expression() {
        let policy = Policy::compile(
            "topology L: linear \"x\"\n\
             topology R: linear \"p\"\n\
             topology S: expr L + R\n\
             topology T: expr S + L",
        )
        .unwrap();
        assert!(policy.contains_tag("T.S.L.x"));
        assert!(policy.contains_tag("T.S.R.p"));
        assert!(policy.contains_tag("T.L.x"));
    }

    #[test]
    fn test_duplicate_topology_rejected() {
        let err = Policy::compile(
            "topology PP: linear \"A\"\n\
             topology PP: linear \"B\"",
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateTopology(name) if name == "PP"));
    }

    #[test]
    fn test_duplicate_expression_name_rejected() {
        let err = Policy::compile(
            "topology PP: linear \"A\"\n\
             topology PP: expr PP",
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateTopology(name) if name == "PP"));
    }

    #[test]
    fn test_unknown_topology_in_expression() {
        let err = Policy::compile("topology T: expr missing").unwrap_err();
        assert!(matches!(err, PolicyError::UnknownTopology(name) if name == "missing"));
    }

    #[test]
    fn test_perimeter_guard_resolution() {
        let policy = Policy::compile(
            "topology PP: linear \"private\",\"public\"\n\
             pg output { file: \"stdout\" tag = \"PP.public\" }",
        )
        .unwrap();
        let guards = policy.perimeter_guards();
        assert_eq!(guards.len(), 1);
        assert_eq!(guards[0].name, "output");
        assert_eq!(guards[0].file, "stdout");
        assert_eq!(guards[0].tag, policy.tag_index("PP.public").unwrap());
    }

    #[test]
    fn test_perimeter_guard_unknown_tag() {
        let err = Policy::compile(
            "topology PP: linear \"A\"\n\
             pg output { file: \"stdout\" tag = \"PP.missing\" }",
        )
        .unwrap_err();
        assert!(
            matches!(err, PolicyError::UnknownPgTag { guard, tag }
                if guard == "output" && tag == "PP.missing")
        );
    }

    #[test]
    fn test_perimeter_guard_accepts_unknown_vertex() {
        let policy = Policy::compile(
            "topology PP: linear \"A\"\n\
             pg input { file: \"stdin\" tag = \"unknown\" }",
        )
        .unwrap();
        assert_eq!(policy.perimeter_guards()[0].tag, 0);
    }

    #[test]
    fn test_aware_is_surfaced_but_not_compiled() {
        let policy = Policy::compile(
            "topology PP: linear \"A\"\n\
             aware W: linear \"a\",\"b\"",
        )
        .unwrap();
        assert_eq!(policy.awares().len(), 1);
        assert_eq!(policy.awares()[0].name, "W");
        // Aware tags do not enter the tag set or the master topology.
        assert!(!policy.contains_tag("W.a"));
        assert_eq!(policy.topology().size(), 2);
    }

    #[test]
    fn test_expression_cannot_reference_aware() {
        let err = Policy::compile(
            "aware W: linear \"a\"\n\
             topology T: expr W",
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownTopology(name) if name == "W"));
    }

    #[test]
    fn test_tag_names_are_whitespace_stripped() {
        let policy = Policy::compile("topology PP: linear \" A \",\"B\"").unwrap();
        assert!(policy.contains_tag("PP.A"));
        assert!(policy.contains_tag(" PP . A "));
        assert_eq!(policy.tag_index("PP.A"), policy.tag_index("PP. A"));
    }

    #[test]
    fn test_too_many_tags() {
        let tags: Vec<String> = (0..300).map(|i| format!("\"t{i}\"")).collect();
        let text = format!("topology BIG: linear {}", tags.join(","));
        let err = Policy::compile(&text).unwrap_err();
        assert!(matches!(err, PolicyError::TooManyTags(301)));
    }

    #[test]
    fn test_dump_header_round_trip() {
        let policy = Policy::compile(
            "topology PP: linear \"private\",\"public\"\n\
             pg output { file: \"stdout\" tag = \"PP.public\" }",
        )
        .unwrap();
        let mut buffer = Vec::new();
        policy.dump(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert_eq!(header, "3 1");

        // Tag-name sequence matches the master topology's index order.
        let names: Vec<&str> = lines
            .by_ref()
            .take(3)
            .map(|line| line.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(names, vec!["unknown", "PP.private", "PP.public"]);

        let pg_line = lines.next().unwrap();
        assert_eq!(
            pg_line,
            format!("output \"stdout\" {}", policy.tag_index("PP.public").unwrap())
        );
    }

    #[test]
    fn test_dump_rows_carry_full_lca_matrix() {
        let policy = Policy::compile("topology PP: linear \"A\",\"B\"").unwrap();
        let mut buffer = Vec::new();
        policy.dump(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let row: Vec<&str> = text.lines().nth(1).unwrap().split_whitespace().collect();
        // "unknown" followed by N matrix entries.
        assert_eq!(row.len(), 1 + policy.topology().size());
        assert_eq!(row[0], "unknown");
        assert_eq!(row[1], "0");
    }
}
