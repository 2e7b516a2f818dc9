use std::mem::size_of;

use crate::error::RenderError;

/// Record kinds, stored in the first header word of each record.
pub const RECORD_KIND_RAY_GENERATION: u32 = 0;
pub const RECORD_KIND_MISS: u32 = 1;
pub const RECORD_KIND_HIT_GROUP: u32 = 2;

/// One binding-table record, padded to the conventional 64-byte shader-group
/// base alignment so the table packs at a fixed stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShaderRecord {
    pub header: [u32; 4],
    pub params: [[f32; 4]; 3],
}

impl ShaderRecord {
    fn new(kind: u32) -> Self {
        Self {
            header: [kind, 0, 0, 0],
            ..Self::default()
        }
    }
}

/// Shading parameters of one hit group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitGroupDesc {
    pub base_color: [f32; 4],
    pub reflectance: f32,
}

/// Region offsets into the packed record array, in record units.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SbtLayout {
    pub ray_generation_offset: u32,
    pub miss_offset: u32,
    pub hit_group_offset: u32,
    pub hit_group_count: u32,
}

/// Ordered table of ray-generation, miss and hit-group records. Rebuilt
/// whenever the hit-group set changes; with a static geometry set that is
/// once per session, but the contract supports arbitrarily many groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderBindingTable {
    layout: SbtLayout,
    records: Vec<ShaderRecord>,
    hit_groups: Vec<HitGroupDesc>,
}

impl ShaderBindingTable {
    pub const RECORD_STRIDE: usize = size_of::<ShaderRecord>();

    /// Packs raygen | miss | hit records contiguously and validates every
    /// per-instance hit-group assignment against the group count.
    pub fn build(
        hit_groups: &[HitGroupDesc],
        instance_hit_groups: impl IntoIterator<Item = u32>,
    ) -> Result<Self, RenderError> {
        if hit_groups.is_empty() {
            return Err(RenderError::InvalidGeometry(
                "binding table needs at least one hit group".to_string(),
            ));
        }
        for assignment in instance_hit_groups {
            if assignment as usize >= hit_groups.len() {
                return Err(RenderError::InvalidGeometry(format!(
                    "instance assigned hit group {assignment}, table has {}",
                    hit_groups.len()
                )));
            }
        }

        let mut records = Vec::with_capacity(2 + hit_groups.len());
        records.push(ShaderRecord::new(RECORD_KIND_RAY_GENERATION));
        let miss_offset = records.len() as u32;
        records.push(ShaderRecord::new(RECORD_KIND_MISS));
        let hit_group_offset = records.len() as u32;
        for group in hit_groups {
            let mut record = ShaderRecord::new(RECORD_KIND_HIT_GROUP);
            record.params[0] = group.base_color;
            record.params[1][0] = group.reflectance;
            records.push(record);
        }

        Ok(Self {
            layout: SbtLayout {
                ray_generation_offset: 0,
                miss_offset,
                hit_group_offset,
                hit_group_count: hit_groups.len() as u32,
            },
            records,
            hit_groups: hit_groups.to_vec(),
        })
    }

    pub fn layout(&self) -> SbtLayout {
        self.layout
    }

    pub fn records(&self) -> &[ShaderRecord] {
        &self.records
    }

    pub fn hit_group_count(&self) -> u32 {
        self.layout.hit_group_count
    }

    /// A table only goes stale when the number or content of hit groups
    /// changes.
    pub fn needs_rebuild(&self, hit_groups: &[HitGroupDesc]) -> bool {
        self.hit_groups.as_slice() != hit_groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(n: usize) -> Vec<HitGroupDesc> {
        (0..n)
            .map(|i| HitGroupDesc {
                base_color: [i as f32, 0.5, 0.5, 1.0],
                reflectance: 0.1 * i as f32,
            })
            .collect()
    }

    #[test]
    fn records_are_stride_aligned() {
        assert_eq!(ShaderBindingTable::RECORD_STRIDE, 64);
        assert_eq!(ShaderBindingTable::RECORD_STRIDE % 64, 0);
    }

    #[test]
    fn regions_pack_contiguously() {
        let table = ShaderBindingTable::build(&groups(3), [0, 1, 2, 2]).unwrap();
        let layout = table.layout();

        assert_eq!(layout.ray_generation_offset, 0);
        assert_eq!(layout.miss_offset, 1);
        assert_eq!(layout.hit_group_offset, 2);
        assert_eq!(layout.hit_group_count, 3);
        assert_eq!(table.records().len(), 5);

        assert_eq!(table.records()[0].header[0], RECORD_KIND_RAY_GENERATION);
        assert_eq!(table.records()[1].header[0], RECORD_KIND_MISS);
        for record in &table.records()[2..] {
            assert_eq!(record.header[0], RECORD_KIND_HIT_GROUP);
        }
    }

    #[test]
    fn hit_records_carry_their_parameters() {
        let table = ShaderBindingTable::build(&groups(2), []).unwrap();
        let hit_base = table.layout().hit_group_offset as usize;
        assert_eq!(table.records()[hit_base + 1].params[0][0], 1.0);
        assert_eq!(table.records()[hit_base + 1].params[1][0], 0.1);
    }

    #[test]
    fn out_of_range_assignment_is_rejected() {
        assert!(matches!(
            ShaderBindingTable::build(&groups(2), [0, 2]),
            Err(RenderError::InvalidGeometry(_))
        ));
        assert!(matches!(
            ShaderBindingTable::build(&[], []),
            Err(RenderError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn rebuild_detection_tracks_group_set() {
        let table = ShaderBindingTable::build(&groups(2), []).unwrap();
        assert!(!table.needs_rebuild(&groups(2)));
        assert!(table.needs_rebuild(&groups(3)));

        let mut changed = groups(2);
        changed[1].reflectance = 0.9;
        assert!(table.needs_rebuild(&changed));
    }
}
