use std::cmp::Ordering;

use maths::{Aabb, Vec3};

/// Max primitives per leaf before a split stops.
pub const BVH_LEAF_SIZE: usize = 4;

/// GPU-facing BVH node. Interior nodes carry child indices, leaves carry a
/// range into the primitive index list; `u32::MAX` children mark a leaf.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BvhNode {
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    pub left_child: u32,
    pub right_child: u32,
    pub first_primitive: u32,
    pub primitive_count: u32,
}

impl BvhNode {
    fn new_leaf(bounds: Aabb, first_primitive: u32, primitive_count: usize) -> Self {
        Self {
            bounds_min: padded(bounds.min),
            bounds_max: padded(bounds.max),
            left_child: u32::MAX,
            right_child: u32::MAX,
            first_primitive,
            primitive_count: primitive_count as u32,
        }
    }

    fn new_interior(bounds: Aabb, left_child: u32, right_child: u32) -> Self {
        Self {
            bounds_min: padded(bounds.min),
            bounds_max: padded(bounds.max),
            left_child,
            right_child,
            first_primitive: 0,
            primitive_count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left_child == u32::MAX && self.right_child == u32::MAX
    }

    /// Empty leaf with inverted-infinite bounds; safe filler for GPU buffers
    /// that must not be zero-sized. No ray can enter it and traversal stops
    /// immediately.
    pub fn placeholder() -> Self {
        Self::new_leaf(Aabb::empty(), 0, 0)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.bounds_min[0], self.bounds_min[1], self.bounds_min[2]),
            Vec3::new(self.bounds_max[0], self.bounds_max[1], self.bounds_max[2]),
        )
    }
}

/// Flattened hierarchy: node 0 is the root, leaves index into
/// `primitive_indices`, which is a permutation of the input primitive ids.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    pub primitive_indices: Vec<u32>,
}

impl Bvh {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::empty(), BvhNode::bounds)
    }
}

struct Primitive {
    index: u32,
    bounds: Aabb,
    centroid: Vec3,
}

/// Builds a BVH over pre-computed primitive bounds. Both acceleration levels
/// go through here: triangles for a bottom-level build, world-space instance
/// boxes for the top level.
pub fn build(primitive_bounds: &[Aabb]) -> Bvh {
    if primitive_bounds.is_empty() {
        return Bvh::default();
    }

    let mut primitives: Vec<Primitive> = primitive_bounds
        .iter()
        .enumerate()
        .map(|(index, bounds)| Primitive {
            index: index as u32,
            bounds: *bounds,
            centroid: bounds.center(),
        })
        .collect();

    // Worst case is one primitive per leaf: 2n - 1 nodes.
    let mut nodes = Vec::with_capacity(primitive_bounds.len() * 2);
    let mut primitive_indices = Vec::with_capacity(primitive_bounds.len());
    build_recursive(&mut primitives, &mut nodes, &mut primitive_indices);

    Bvh {
        nodes,
        primitive_indices,
    }
}

fn build_recursive(
    primitives: &mut [Primitive],
    nodes: &mut Vec<BvhNode>,
    primitive_indices: &mut Vec<u32>,
) -> u32 {
    let node_index = nodes.len() as u32;
    nodes.push(BvhNode::default());

    let mut bounds = Aabb::empty();
    for primitive in primitives.iter() {
        bounds = bounds.union(&primitive.bounds);
    }

    if primitives.len() <= BVH_LEAF_SIZE {
        let first_primitive = primitive_indices.len() as u32;
        primitive_indices.extend(primitives.iter().map(|p| p.index));
        nodes[node_index as usize] = BvhNode::new_leaf(bounds, first_primitive, primitives.len());
        return node_index;
    }

    // Median split along the widest axis.
    let extent = bounds.extent();
    let mut axis = 0;
    if extent.y > extent.x {
        axis = 1;
    }
    if extent.z > extent.component(axis) {
        axis = 2;
    }

    let mid = primitives.len() / 2;
    primitives.select_nth_unstable_by(mid, |a, b| {
        a.centroid
            .component(axis)
            .partial_cmp(&b.centroid.component(axis))
            .unwrap_or(Ordering::Equal)
    });

    let (left, right) = primitives.split_at_mut(mid);
    if left.is_empty() || right.is_empty() {
        // Unreachable given the leaf-size check, but a degenerate partition
        // must still terminate as a leaf.
        let first_primitive = primitive_indices.len() as u32;
        primitive_indices.extend(primitives.iter().map(|p| p.index));
        nodes[node_index as usize] = BvhNode::new_leaf(bounds, first_primitive, primitives.len());
        return node_index;
    }

    let left_child = build_recursive(left, nodes, primitive_indices);
    let right_child = build_recursive(right, nodes, primitive_indices);
    nodes[node_index as usize] = BvhNode::new_interior(bounds, left_child, right_child);

    node_index
}

fn padded(vec: Vec3) -> [f32; 4] {
    [vec.x, vec.y, vec.z, 0.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_boxes(count: usize) -> Vec<Aabb> {
        (0..count)
            .map(|i| {
                let x = (i % 10) as f32 * 2.0;
                let z = (i / 10) as f32 * 2.0;
                Aabb::new(Vec3::new(x, 0.0, z), Vec3::new(x + 1.0, 1.0, z + 1.0))
            })
            .collect()
    }

    fn assert_contains(outer: &Aabb, inner: &Aabb) {
        assert!(outer.min.x <= inner.min.x && outer.max.x >= inner.max.x);
        assert!(outer.min.y <= inner.min.y && outer.max.y >= inner.max.y);
        assert!(outer.min.z <= inner.min.z && outer.max.z >= inner.max.z);
    }

    #[test]
    fn empty_input_builds_empty_bvh() {
        assert!(build(&[]).is_empty());
    }

    #[test]
    fn small_input_is_a_single_leaf() {
        let bvh = build(&grid_boxes(BVH_LEAF_SIZE));
        assert_eq!(bvh.nodes.len(), 1);
        assert!(bvh.nodes[0].is_leaf());
        assert_eq!(bvh.nodes[0].primitive_count as usize, BVH_LEAF_SIZE);
    }

    #[test]
    fn every_primitive_lands_in_exactly_one_leaf() {
        let boxes = grid_boxes(137);
        let bvh = build(&boxes);

        let mut seen = vec![0u32; boxes.len()];
        for node in &bvh.nodes {
            if node.is_leaf() {
                let first = node.first_primitive as usize;
                for &primitive in &bvh.primitive_indices[first..first + node.primitive_count as usize]
                {
                    seen[primitive as usize] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
        assert_eq!(bvh.primitive_indices.len(), boxes.len());
    }

    #[test]
    fn interior_bounds_contain_children() {
        let bvh = build(&grid_boxes(64));
        for node in &bvh.nodes {
            if !node.is_leaf() {
                let bounds = node.bounds();
                assert_contains(&bounds, &bvh.nodes[node.left_child as usize].bounds());
                assert_contains(&bounds, &bvh.nodes[node.right_child as usize].bounds());
            }
        }
    }

    #[test]
    fn build_is_deterministic() {
        let boxes = grid_boxes(100);
        assert_eq!(build(&boxes), build(&boxes));
    }

    #[test]
    fn node_count_is_linear_in_primitives() {
        for count in [10usize, 100, 1000] {
            let bvh = build(&grid_boxes(count));
            assert!(bvh.nodes.len() <= 2 * count);
        }
    }
}
