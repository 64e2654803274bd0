//! Expression compilation and runtime iteration
//!
//! A compiled expression is a list of pipelines (OR alternatives), each an
//! ordered list of nodes (AND-ed stages). A node owns its detector uid plus
//! any colon-attached effect uids, and a `cut` flag cleared by the `~`
//! prefix. AND appends one shared node to every pipeline that exists at that
//! point; nodes live in an arena and pipelines reference them by id.

use crate::token::{is_logical_operator, LogicalOperator, OP_AND, OP_COLON, OP_OR, OP_UNCUT};

type NodeId = usize;

/// How a node entered the expression; drives lossless token round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOrigin {
    First,
    And,
    Or,
}

#[derive(Debug)]
struct PluginNode {
    /// Position 0 is the detector (or sole plugin), the rest are effects.
    plugins: Vec<String>,
    origin: NodeOrigin,
    cut: bool,
    /// Cursor over `plugins`
    pos: usize,
    included: bool,
}

impl PluginNode {
    fn new(uid: String, cut: bool, origin: NodeOrigin) -> Self {
        Self {
            plugins: vec![uid],
            origin,
            cut,
            pos: 0,
            included: true,
        }
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.included = true;
    }

    /// Consume the previous verdict. Only the verdict following the detector
    /// (position 1) decides inclusion; an uncut node stays included and
    /// reports pass regardless of it, so its effects still dispense.
    fn post(&mut self, include: bool) -> bool {
        if self.pos == 1 {
            self.included = if self.cut { include } else { true };
        }
        if !self.cut {
            return true;
        }
        include
    }

    fn pop(&mut self) -> Option<String> {
        if !self.included {
            return None;
        }
        let uid = self.plugins.get(self.pos)?.clone();
        self.pos += 1;
        Some(uid)
    }
}

#[derive(Debug)]
struct PluginPipeline {
    nodes: Vec<NodeId>,
    /// Cursor over `nodes`
    pos: usize,
    essential: bool,
}

impl PluginPipeline {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            pos: 0,
            essential: false,
        }
    }

    /// An essential pipeline is evaluated even when an earlier alternative
    /// already passed; only a pipeline still at a single node qualifies.
    fn set_essential(&mut self) {
        if self.nodes.len() == 1 {
            self.essential = true;
        }
    }
}

/// What a pipeline yields on one pop.
enum PipelinePop {
    Uid(String),
    /// Current node gated out or exhausted mid-pipeline
    Empty,
    /// All nodes of the pipeline consumed
    EndOfPipeline,
}

/// Compiled expression plus the runtime cursor state.
///
/// `next_plugin` yields uids until the expression is exhausted (`None`);
/// `include` then holds the frame verdict.
#[derive(Debug)]
pub struct LogicAnalyzer {
    expression: Vec<String>,
    nodes: Vec<PluginNode>,
    pipelines: Vec<PluginPipeline>,
    /// Cursor over `pipelines`
    pos: usize,
    include: bool,
}

impl LogicAnalyzer {
    /// Compile a validated token stream.
    pub fn compile(expression: &[String]) -> Self {
        let mut analyzer = Self {
            expression: expression.to_vec(),
            nodes: Vec::new(),
            pipelines: vec![PluginPipeline::new()],
            pos: 0,
            include: false,
        };
        analyzer.run_analysis(expression);
        analyzer.reset();
        analyzer
    }

    fn run_analysis(&mut self, expression: &[String]) {
        let mut cut = true;
        let mut op = LogicalOperator::None;
        let mut current_node: Option<NodeId> = None;
        // The pipeline colon chains bind to: the most recently opened one.
        let mut current_pipeline = 0usize;

        for token in expression {
            let token = token.as_str();

            if token == OP_UNCUT {
                cut = false;
                continue;
            }

            if is_logical_operator(token) {
                op = LogicalOperator::parse(token);
                continue;
            }

            match op {
                LogicalOperator::And => {
                    // One shared node appended to every pipeline.
                    let id = self.add_node(PluginNode::new(token.into(), cut, NodeOrigin::And));
                    for pipeline in &mut self.pipelines {
                        pipeline.nodes.push(id);
                    }
                    current_node = Some(id);
                }
                LogicalOperator::Or => {
                    self.pipelines.push(PluginPipeline::new());
                    current_pipeline = self.pipelines.len() - 1;
                    let id = self.add_node(PluginNode::new(token.into(), cut, NodeOrigin::Or));
                    self.pipelines[current_pipeline].nodes.push(id);
                    current_node = Some(id);
                }
                LogicalOperator::Colon => {
                    if let Some(node) = current_node {
                        self.nodes[node].plugins.push(token.into());
                    }
                    if self.pipelines.len() > 1 {
                        self.pipelines[current_pipeline].set_essential();
                    }
                }
                LogicalOperator::None => {
                    let id = self.add_node(PluginNode::new(token.into(), cut, NodeOrigin::First));
                    self.pipelines[current_pipeline].nodes.push(id);
                    current_node = Some(id);
                }
            }
            op = LogicalOperator::None;
            cut = true;
        }
    }

    fn add_node(&mut self, node: PluginNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Rewind all cursors for the next frame.
    pub fn reset(&mut self) {
        self.pos = 0;
        for pipeline in &mut self.pipelines {
            pipeline.pos = 0;
        }
        for node in &mut self.nodes {
            node.reset();
        }
    }

    fn reset_pipeline(&mut self, p: usize) {
        self.pipelines[p].pos = 0;
        for i in 0..self.pipelines[p].nodes.len() {
            let id = self.pipelines[p].nodes[i];
            self.nodes[id].reset();
        }
    }

    fn pop_pipeline(&mut self, p: usize, include: bool) -> PipelinePop {
        // A gated-out node abandons the rest of its pipeline.
        if !include {
            return PipelinePop::Empty;
        }

        let node = self.pipelines[p].nodes[self.pipelines[p].pos];
        if let Some(uid) = self.nodes[node].pop() {
            return PipelinePop::Uid(uid);
        }

        // Current node exhausted, move to the next one.
        self.pipelines[p].pos += 1;
        if self.pipelines[p].pos >= self.pipelines[p].nodes.len() {
            return PipelinePop::EndOfPipeline;
        }

        let next = self.pipelines[p].nodes[self.pipelines[p].pos];
        match self.nodes[next].pop() {
            Some(uid) => PipelinePop::Uid(uid),
            None => PipelinePop::Empty,
        }
    }

    /// Yield the uid of the next plugin to run, fed with the verdict of the
    /// previously executed one. `None` is end-of-plugins for this frame.
    pub fn next_plugin(&mut self, include: bool) -> Option<String> {
        let mut include = include;

        loop {
            if self.pos >= self.pipelines.len() {
                return None;
            }

            let pipeline = &self.pipelines[self.pos];
            if pipeline.nodes.is_empty() || pipeline.pos >= pipeline.nodes.len() {
                return None;
            }

            let node = pipeline.nodes[pipeline.pos];
            self.include = self.nodes[node].post(include);
            let popped = self.pop_pipeline(self.pos, self.include);

            match popped {
                PipelinePop::Uid(uid) => return Some(uid),
                PipelinePop::EndOfPipeline => {
                    // One pipeline fully passed; only essential alternatives
                    // still need to run.
                    self.pos += 1;
                    while self.pos < self.pipelines.len() && !self.pipelines[self.pos].essential {
                        self.pos += 1;
                    }
                }
                PipelinePop::Empty => {
                    // This alternative failed; try the next one.
                    self.pos += 1;
                }
            }

            if self.pos >= self.pipelines.len() {
                return None;
            }
            self.reset_pipeline(self.pos);
            include = true;
        }
    }

    /// Frame verdict once `next_plugin` returned `None`.
    pub fn include(&self) -> bool {
        self.include
    }

    pub fn expression(&self) -> &[String] {
        &self.expression
    }

    /// Serialize the compiled pipelines back into token form. Compiling the
    /// result yields identical pipelines.
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        for node in &self.nodes {
            match node.origin {
                NodeOrigin::First => {}
                NodeOrigin::And => tokens.push(OP_AND.to_string()),
                NodeOrigin::Or => tokens.push(OP_OR.to_string()),
            }
            if !node.cut {
                tokens.push(OP_UNCUT.to_string());
            }
            for (i, uid) in node.plugins.iter().enumerate() {
                if i > 0 {
                    tokens.push(OP_COLON.to_string());
                }
                tokens.push(uid.clone());
            }
        }
        tokens
    }

    #[cfg(test)]
    fn pipeline_shapes(&self) -> Vec<(bool, Vec<Vec<String>>)> {
        self.pipelines
            .iter()
            .map(|p| {
                (
                    p.essential,
                    p.nodes
                        .iter()
                        .map(|&id| self.nodes[id].plugins.clone())
                        .collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_next_plugin_single_plugin() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["A"]));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(true), None);
    }

    #[test]
    fn test_next_plugin_only_effects() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["E0", ":", "E1", ":", "E2"]));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E0"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E1"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E2"));
        assert_eq!(logic.next_plugin(true), None);
    }

    #[test]
    fn test_next_plugin_detector_with_effects() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["A", ":", "E0", ":", "E1"]));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E0"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E1"));
        assert_eq!(logic.next_plugin(true), None);
        logic.reset();

        // A false verdict gates the effects off.
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false), None);
        assert!(!logic.include());
    }

    #[test]
    fn test_next_plugin_or_and_trace() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["A", "|", "B", "&", "C"]));

        // A false sends evaluation to the OR alternative.
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(false), None);
        assert!(!logic.include());
        logic.reset();

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("C"));
        assert_eq!(logic.next_plugin(true), None);
        assert!(logic.include());
    }

    #[test]
    fn test_or_short_circuit_skips_non_essential() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["A", "|", "B", "&", "C", ":", "E"]));

        // A passes; the AND-ed C:E node runs in the same pipeline; B's
        // pipeline is not essential (two nodes) and is skipped.
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("C"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(false), None);
    }

    #[test]
    fn test_or_with_essential_effect_pipeline() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["A", "|", "B", ":", "E"]));

        // Even though A passes, the essential B:E pipeline still runs.
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E"));
        assert_eq!(logic.next_plugin(true), None);
    }

    #[test]
    fn test_complex_or_and_traces() {
        let expr = tokens(&["A", "|", "B", "&", "C", "|", "D", "&", "E"]);

        let mut logic = LogicAnalyzer::compile(&expr);
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("C"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E"));
        assert_eq!(logic.next_plugin(true), None);
        logic.reset();

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("D"));
        assert_eq!(logic.next_plugin(false), None);
        logic.reset();

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("C"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E"));
        assert_eq!(logic.next_plugin(true), None);
        logic.reset();

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("D"));
        assert_eq!(logic.next_plugin(true).as_deref(), Some("E"));
        assert_eq!(logic.next_plugin(true), None);
    }

    #[test]
    fn test_include_single_plugin() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["A"]));

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(true), None);
        assert!(logic.include());
        logic.reset();

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false), None);
        assert!(!logic.include());
    }

    #[test]
    fn test_include_uncut_never_vetoes() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["~", "A", ":", "E0", ":", "E1"]));

        // The detector fails, yet the node stays included and reports pass.
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("E0"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("E1"));
        assert_eq!(logic.next_plugin(false), None);
        assert!(logic.include());
    }

    #[test]
    fn test_include_chain_of_uncut_nodes() {
        let expr = tokens(&[
            "~", "A", ":", "E0", "&", "~", "B", ":", "E1", "&", "~", "C", ":", "E2",
        ]);
        let mut logic = LogicAnalyzer::compile(&expr);

        // Failing detectors neither veto inclusion nor gate their effects.
        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("E0"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("B"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("E1"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("C"));
        assert_eq!(logic.next_plugin(false).as_deref(), Some("E2"));
        assert_eq!(logic.next_plugin(false), None);
        assert!(logic.include());
    }

    #[test]
    fn test_uncut_node_still_yields_effects() {
        let mut logic = LogicAnalyzer::compile(&tokens(&["~", "A", ":", "E"]));

        assert_eq!(logic.next_plugin(true).as_deref(), Some("A"));
        // post(false) keeps the uncut node included, so E still runs.
        assert_eq!(logic.next_plugin(false).as_deref(), Some("E"));
        assert_eq!(logic.next_plugin(true), None);
        assert!(logic.include());
    }

    #[test]
    fn test_and_appends_shared_node_to_all_pipelines() {
        let logic = LogicAnalyzer::compile(&tokens(&["A", "|", "B", "&", "C"]));
        let shapes = logic.pipeline_shapes();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].1, vec![vec!["A".to_string()], vec!["C".to_string()]]);
        assert_eq!(shapes[1].1, vec![vec!["B".to_string()], vec!["C".to_string()]]);
    }

    #[test]
    fn test_essential_only_for_single_node_pipelines() {
        let logic = LogicAnalyzer::compile(&tokens(&["A", "|", "B", ":", "E"]));
        let shapes = logic.pipeline_shapes();
        assert!(!shapes[0].0);
        assert!(shapes[1].0);

        // A colon chain on a pipeline that already has two nodes does not
        // mark it essential.
        let logic = LogicAnalyzer::compile(&tokens(&["A", "|", "B", "&", "C", ":", "E"]));
        let shapes = logic.pipeline_shapes();
        assert!(!shapes[1].0);
    }

    #[test]
    fn test_to_tokens_round_trip() {
        let cases: Vec<Vec<String>> = vec![
            tokens(&["A"]),
            tokens(&["A", ":", "E0", ":", "E1"]),
            tokens(&["~", "A", ":", "E0"]),
            tokens(&["A", "|", "B", "&", "C"]),
            tokens(&["A", "|", "B", ":", "E"]),
            tokens(&["A", "|", "B", "&", "C", "|", "D", "&", "E"]),
            tokens(&[
                "~", "A", ":", "E0", "&", "~", "B", ":", "E1", "&", "~", "C", ":", "E2",
            ]),
        ];

        for expr in cases {
            let compiled = LogicAnalyzer::compile(&expr);
            let emitted = compiled.to_tokens();
            assert_eq!(emitted, expr);

            let recompiled = LogicAnalyzer::compile(&emitted);
            assert_eq!(recompiled.pipeline_shapes(), compiled.pipeline_shapes());
        }
    }
}
