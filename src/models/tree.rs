//! Regression trees used as boosting rounds.

use serde::{Deserialize, Serialize};

/// A node of a regression tree. Children are indices into the tree's node
/// list; `cover` is the sum of training hessians that reached the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        /// Taken when `x[feature] < threshold`
        left: usize,
        right: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// Binary regression tree with the root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Output of the leaf reached by `x`.
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if x[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value: the tree's expected output over the
    /// training distribution.
    pub fn expected_value(&self) -> f64 {
        self.expected_value_at(0)
    }

    fn expected_value_at(&self, index: usize) -> f64 {
        match &self.nodes[index] {
            Node::Leaf { value, .. } => *value,
            Node::Split {
                left, right, cover, ..
            } => {
                let left_cover = self.nodes[*left].cover();
                let right_cover = self.nodes[*right].cover();
                (left_cover * self.expected_value_at(*left)
                    + right_cover * self.expected_value_at(*right))
                    / cover
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.depth_at(0)
    }

    fn depth_at(&self, index: usize) -> usize {
        match &self.nodes[index] {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => {
                1 + self.depth_at(*left).max(self.depth_at(*right))
            }
        }
    }

    /// Check structural integrity of a deserialized tree: child indices in
    /// range and pointing forward, split features within `num_features`,
    /// positive covers with children summing to their parent.
    pub fn validate(&self, num_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if !(node.cover() > 0.0) {
                return Err(format!("node {} has non-positive cover", index));
            }
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
                cover,
            } = node
            {
                if *feature >= num_features {
                    return Err(format!(
                        "node {} splits on feature {} of {}",
                        index, feature, num_features
                    ));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has a non-finite threshold", index));
                }
                for child in [*left, *right] {
                    if child <= index || child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child {}", index, child));
                    }
                }
                let children = self.nodes[*left].cover() + self.nodes[*right].cover();
                if (children - cover).abs() > 1e-6 * cover.max(1.0) {
                    return Err(format!("node {} cover does not match its children", index));
                }
            }
        }
        Ok(())
    }
}

/// Growth limits and regularization for a single tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthParams {
    pub max_depth: usize,
    pub lambda: f64,
    pub min_child_weight: f64,
    pub min_split_gain: f64,
    pub learning_rate: f64,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left_rows: Vec<usize>,
    right_rows: Vec<usize>,
}

/// Grows one tree on first/second order gradients with exact greedy split
/// search.
pub(crate) struct TreeGrower<'a> {
    rows: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: GrowthParams,
    num_features: usize,
}

impl<'a> TreeGrower<'a> {
    pub fn new(
        rows: &'a [Vec<f64>],
        grad: &'a [f64],
        hess: &'a [f64],
        params: GrowthParams,
    ) -> Self {
        let num_features = rows.first().map(Vec::len).unwrap_or(0);
        Self {
            rows,
            grad,
            hess,
            params,
            num_features,
        }
    }

    pub fn grow(&self) -> RegressionTree {
        let mut nodes = Vec::new();
        let all_rows: Vec<usize> = (0..self.rows.len()).collect();
        self.build(&mut nodes, all_rows, 0);
        RegressionTree::new(nodes)
    }

    fn build(&self, nodes: &mut Vec<Node>, rows: Vec<usize>, depth: usize) -> usize {
        let (g, h) = self.sums(&rows);
        let index = nodes.len();
        nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
            cover: h,
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return index;
        }

        if let Some(split) = self.best_split(&rows, g, h) {
            let left = self.build(nodes, split.left_rows, depth + 1);
            let right = self.build(nodes, split.right_rows, depth + 1);
            let cover = nodes[left].cover() + nodes[right].cover();
            nodes[index] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
                cover,
            };
        }
        index
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.grad[r], h + self.hess[r]))
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent_score = self.score(g, h);
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..self.num_features {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut gl = 0.0;
            let mut hl = 0.0;
            for pair in sorted.windows(2) {
                let (current, next) = (pair[0], pair[1]);
                gl += self.grad[current];
                hl += self.hess[current];

                let value = self.rows[current][feature];
                let next_value = self.rows[next][feature];
                if value == next_value {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent_score);
                if gain > self.params.min_split_gain
                    && best.map_or(true, |(_, _, best_gain)| gain > best_gain)
                {
                    // The midpoint of adjacent floats can round down to `value`
                    let midpoint = value + (next_value - value) / 2.0;
                    let threshold = if midpoint <= value { next_value } else { midpoint };
                    best = Some((feature, threshold, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| {
            let (left_rows, right_rows) = rows
                .iter()
                .copied()
                .partition(|&r| self.rows[r][feature] < threshold);
            SplitCandidate {
                feature,
                threshold,
                left_rows,
                right_rows,
            }
        })
        .filter(|split| !split.left_rows.is_empty() && !split.right_rows.is_empty())
    }
}
