//! Rendering of tree decompositions in the Graphviz DOT format.
use crate::decomposition::TreeDecomposition;

pub trait Dot {
    fn draw(&self, writer: &mut DotWriter);
}

#[derive(Default)]
pub struct DotWriter {
    graph_name: String,
    nodes: Vec<(usize, String)>,
    edges: Vec<(usize, usize)>,
}

impl DotWriter {
    #[must_use]
    pub fn new(graph_name: &str) -> DotWriter {
        DotWriter {
            graph_name: graph_name.to_owned(),
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, idx: usize, label: String) {
        self.nodes.push((idx, label));
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.edges.push((from, to));
    }

    /// # Errors
    ///
    /// Returns an error when the underlying writer fails.
    pub fn write(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(writer, "digraph {} {{", self.graph_name)?;
        writeln!(writer, "  node [shape=box];")?;
        for (idx, label) in &self.nodes {
            writeln!(writer, "  {idx} [label=\"{label}\"];")?;
        }
        for (from, to) in &self.edges {
            writeln!(writer, "  {from} -> {to};")?;
        }
        writeln!(writer, "}}")
    }
}

impl Dot for TreeDecomposition {
    fn draw(&self, writer: &mut DotWriter) {
        for bag in self.bags() {
            let variables = bag
                .variables()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            writer.add_node(
                bag.id().0 as usize,
                format!("bag {} ({})\\n{{{variables}}}", bag.id(), self.kind_of(bag.id())),
            );
            for child in bag.children() {
                writer.add_edge(bag.id().0 as usize, child.0 as usize);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Dot, DotWriter};
    use crate::decomposition::TreeDecomposition;

    #[test]
    fn decomposition_renders_bags_and_edges() {
        let decomp = TreeDecomposition::from_adjacency(
            vec![vec![1, 2], vec![2, 3]],
            &[(1, 2)],
            3,
        )
        .unwrap();

        let mut writer = DotWriter::new("decomposition");
        decomp.draw(&mut writer);
        let mut rendered = Vec::new();
        writer.write(&mut rendered).unwrap();
        let rendered = String::from_utf8(rendered).unwrap();

        assert!(rendered.contains("digraph decomposition {"));
        assert!(rendered.contains("bag 0 (introduce-forget)"));
        assert!(rendered.contains("{2 3}"));
        assert!(rendered.contains("0 -> 1;"));
    }
}
