use super::{Species, TILE_SIZE};

// Blelloch scan block sizes: a warp-sized block for short inputs, a
// thread-block-sized one otherwise.
const BLOCK_MIN: usize = 32;
const BLOCK_FULL: usize = 1024;

fn prefix_sum_block(vector: &mut [i32], block: usize) {
    let size = vector.len();
    let num_blocks = (size + block - 1) / block;
    let mut block_sum = vec![0i32; num_blocks];

    let mut local = vec![0i32; block];
    for block_id in 0..num_blocks {
        let begin = block_id * block;
        for i in 0..block {
            local[i] = if begin + i < size { vector[begin + i] } else { 0 };
        }

        // up-sweep
        let mut offset = 1;
        while offset < block {
            let mut i = offset - 1;
            while i + offset < block {
                local[i + offset] += local[i];
                i += 2 * offset;
            }
            offset *= 2;
        }

        block_sum[block_id] = local[block - 1];
        local[block - 1] = 0;

        // down-sweep
        let mut offset = block >> 1;
        while offset > 0 {
            let mut i = offset - 1;
            while i + offset < block {
                let temp = local[i];
                local[i] = local[i + offset];
                local[i + offset] += temp;
                i += 2 * offset;
            }
            offset >>= 1;
        }

        for i in 0..block {
            if begin + i < size {
                vector[begin + i] = local[i];
            }
        }
    }

    if num_blocks > 1 {
        prefix_sum(&mut block_sum);
        for block_id in 1..num_blocks {
            let begin = block_id * block;
            for i in 0..block {
                if begin + i < size {
                    vector[begin + i] += block_sum[block_id];
                }
            }
        }
    }
}

/// Exclusive prefix sum in place: entry `i` becomes the sum of all entries
/// before it, and the last entry receives the total when the input ends
/// with a zero sentinel.
pub fn prefix_sum(vector: &mut [i32]) {
    if vector.len() < BLOCK_FULL / 4 {
        prefix_sum_block(vector, BLOCK_MIN);
    } else {
        prefix_sum_block(vector, BLOCK_FULL);
    }
}

#[inline(always)]
fn tile_of(ix: i32, iy: i32, y_lo: i32, n_tiles_x: usize) -> i32 {
    let ts = TILE_SIZE as i32;
    ix / ts + ((iy - y_lo) / ts) * n_tiles_x as i32
}

/// Two-phase scatter through a scratch buffer. With `source == None` the
/// whole array is compacted through `target`; entries with a negative
/// index stay where they are.
fn move_slots<T: Copy + Default>(vector: &mut [T], source: Option<&[i32]>, target: &[i32]) {
    match source {
        None => {
            let n = target.len();
            let mut temp = vec![T::default(); n];
            temp.copy_from_slice(&vector[..n]);
            for i in 0..n {
                if target[i] >= 0 {
                    vector[target[i] as usize] = temp[i];
                }
            }
        }
        Some(src) => {
            let n = target.len();
            let mut temp = vec![T::default(); n];
            for i in 0..n {
                if src[i] >= 0 {
                    temp[i] = vector[src[i] as usize];
                }
            }
            for i in 0..n {
                if src[i] >= 0 {
                    vector[target[i] as usize] = temp[i];
                }
            }
        }
    }
}

/// Full bucket sort over all valid particles: histogram by tile, exclusive
/// prefix sum, per-particle target position, scatter. Used at startup and
/// whenever the incremental invariants cannot be assumed.
pub fn full_sort(spec: &mut Species) {
    let size = spec.main.size;
    let n_tiles = spec.n_tiles_x * spec.n_tiles_y;
    let y_lo = spec.limits_y[0];
    let n_tiles_x = spec.n_tiles_x;

    for v in spec.tile_offset.iter_mut() {
        *v = 0;
    }

    let mut pos = vec![-1i32; size];
    for i in 0..size {
        if !spec.main.invalid[i] {
            let t = tile_of(spec.main.ix[i], spec.main.iy[i], y_lo, n_tiles_x) as usize;
            pos[i] = spec.tile_offset[t];
            spec.tile_offset[t] += 1;
        }
    }

    prefix_sum(&mut spec.tile_offset);

    for i in 0..size {
        if pos[i] >= 0 {
            let t = tile_of(spec.main.ix[i], spec.main.iy[i], y_lo, n_tiles_x) as usize;
            pos[i] += spec.tile_offset[t];
        }
    }

    let final_size = spec.tile_offset[n_tiles] as usize;
    spec.main.size = final_size;

    move_slots(&mut spec.main.ix, None, &pos);
    move_slots(&mut spec.main.iy, None, &pos);
    move_slots(&mut spec.main.x, None, &pos);
    move_slots(&mut spec.main.y, None, &pos);
    move_slots(&mut spec.main.ux, None, &pos);
    move_slots(&mut spec.main.uy, None, &pos);
    move_slots(&mut spec.main.uz, None, &pos);

    for k in 0..final_size {
        spec.main.invalid[k] = false;
    }
    for k in final_size..spec.main.capacity() {
        spec.main.invalid[k] = true;
    }
}

/// New per-tile counts: valid survivors bucketed by their current tile plus
/// everything waiting in the incoming buffers. The old offsets are only
/// used to walk the occupied ranges; the table is then overwritten and
/// prefix-summed by the caller.
fn histogram_np_per_tile(spec: &mut Species) {
    let n_tiles = spec.n_tiles_x * spec.n_tiles_y;
    let y_lo = spec.limits_y[0];
    let n_tiles_x = spec.n_tiles_x;

    let mut np_per_tile = vec![0i32; n_tiles];
    for t in 0..n_tiles {
        let begin = spec.tile_offset[t] as usize;
        let end = spec.tile_offset[t + 1] as usize;
        for k in begin..end {
            if !spec.main.invalid[k] {
                let target = tile_of(spec.main.ix[k], spec.main.iy[k], y_lo, n_tiles_x);
                np_per_tile[target as usize] += 1;
            }
        }
    }
    for inc in spec.incoming.iter() {
        for k in 0..inc.size {
            let target = tile_of(inc.ix[k], inc.iy[k], y_lo, n_tiles_x);
            np_per_tile[target as usize] += 1;
        }
    }

    spec.tile_offset[..n_tiles].copy_from_slice(&np_per_tile);
    spec.tile_offset[n_tiles] = 0;
}

/// Count, per tile, the slots of the new tile range whose occupant is
/// invalid or belongs elsewhere. Slots past the old size hold garbage and
/// are invalidated here. The result sizes the reshuffling work buffers.
fn histogram_moving_particles(spec: &mut Species, old_size: usize) {
    let n_tiles = spec.n_tiles_x * spec.n_tiles_y;
    let y_lo = spec.limits_y[0];
    let n_tiles_x = spec.n_tiles_x;

    for t in 0..n_tiles {
        let begin = spec.tile_offset[t] as usize;
        let end = spec.tile_offset[t + 1] as usize;
        let mut leaving = 0;
        for k in begin..end {
            if k >= old_size {
                spec.main.invalid[k] = true;
            }
            let target = tile_of(spec.main.ix[k], spec.main.iy[k], y_lo, n_tiles_x);
            if spec.main.invalid[k] || target != t as i32 {
                leaving += 1;
            }
        }
        spec.mv_part_offset[t] = leaving;
    }
    spec.mv_part_offset[n_tiles] = 0;
}

/// List the wrong slots of every tile, then pick a source for each hole.
/// Particles moving to the immediate left/right neighbour use monotone
/// counters at the two ends of the neighbour's hole range so that
/// neighbour swaps never collide; everything else bumps the per-tile
/// source counter.
fn calculate_sorted_idx(spec: &mut Species, old_size: usize) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let n_tiles = spec.n_tiles_x * spec.n_tiles_y;
    let n_tiles_x = spec.n_tiles_x;
    let y_lo = spec.limits_y[0];
    let size = spec.main.size;

    let sorting_size = spec.mv_part_offset[n_tiles] as usize;
    let mut source_idx = vec![-1i32; sorting_size];
    let mut target_idx = vec![0i32; sorting_size];
    let mut source_counter: Vec<i32> = spec.mv_part_offset[..n_tiles].to_vec();

    // holes per tile, plus room reserved for right-neighbour arrivals
    for tile_y in 0..spec.n_tiles_y {
        for tile_x in 0..n_tiles_x {
            let t = tile_x + tile_y * n_tiles_x;
            let begin = spec.tile_offset[t] as usize;
            let end = spec.tile_offset[t + 1] as usize;
            let mut offset = spec.mv_part_offset[t];
            let mut right_counter = 0;
            for k in begin..end {
                let target = tile_of(spec.main.ix[k], spec.main.iy[k], y_lo, n_tiles_x);
                let is_invalid = spec.main.invalid[k];
                if is_invalid || target != t as i32 {
                    target_idx[offset as usize] = k as i32;
                    offset += 1;
                }
                if !is_invalid && target == t as i32 + 1 {
                    right_counter += 1;
                }
            }
            if tile_x < n_tiles_x - 1 {
                source_counter[t + 1] += right_counter;
            }
        }
    }

    // pick sources for the holes
    for tile_y in 0..spec.n_tiles_y {
        for tile_x in 0..n_tiles_x {
            let t = tile_x + tile_y * n_tiles_x;
            let begin = spec.mv_part_offset[t];
            let end = spec.mv_part_offset[t + 1];
            let mut left_counter = begin - 1;
            let mut right_counter = end;
            for k in begin..end {
                let source = target_idx[k as usize];
                let target =
                    tile_of(spec.main.ix[source as usize], spec.main.iy[source as usize], y_lo, n_tiles_x);
                if spec.main.invalid[source as usize] {
                    continue;
                }
                let idx = if tile_x > 0 && target == t as i32 - 1 {
                    let idx = left_counter;
                    left_counter -= 1;
                    idx
                } else if tile_x < n_tiles_x - 1 && target == t as i32 + 1 {
                    let idx = right_counter;
                    right_counter += 1;
                    idx
                } else {
                    let idx = source_counter[target as usize];
                    source_counter[target as usize] += 1;
                    idx
                };
                source_idx[idx as usize] = source;
            }
        }
    }

    // valid particles stranded past the shrunk size also become sources
    if size < old_size {
        for k in size..old_size {
            if !spec.main.invalid[k] {
                let target = tile_of(spec.main.ix[k], spec.main.iy[k], y_lo, n_tiles_x);
                let idx = source_counter[target as usize];
                source_counter[target as usize] += 1;
                source_idx[idx as usize] = k as i32;
            }
        }
    }

    (source_idx, target_idx, source_counter)
}

/// Per-step bucket maintenance: re-count the tiles, reshuffle the wrong
/// slots through scratch buffers and merge the incoming transfer vectors.
/// Runs at the end of every step.
pub fn sort(spec: &mut Species) {
    let old_size = spec.main.size;
    let np_inj: usize = spec.incoming.iter().map(|v| v.size).sum();

    if old_size + np_inj > spec.main.capacity() {
        let new_cap = ((spec.main.capacity() + np_inj) / 1024 + 1) * 1024;
        spec.main.realloc(new_cap);
    }

    let n_tiles = spec.n_tiles_x * spec.n_tiles_y;

    histogram_np_per_tile(spec);
    prefix_sum(&mut spec.tile_offset);

    spec.main.size = spec.tile_offset[n_tiles] as usize;

    histogram_moving_particles(spec, old_size);
    prefix_sum(&mut spec.mv_part_offset);

    let (source_idx, target_idx, mut source_counter) = calculate_sorted_idx(spec, old_size);

    move_slots(&mut spec.main.ix, Some(&source_idx), &target_idx);
    move_slots(&mut spec.main.iy, Some(&source_idx), &target_idx);
    move_slots(&mut spec.main.x, Some(&source_idx), &target_idx);
    move_slots(&mut spec.main.y, Some(&source_idx), &target_idx);
    move_slots(&mut spec.main.ux, Some(&source_idx), &target_idx);
    move_slots(&mut spec.main.uy, Some(&source_idx), &target_idx);
    move_slots(&mut spec.main.uz, Some(&source_idx), &target_idx);

    for i in 0..source_idx.len() {
        if source_idx[i] >= 0 {
            spec.main.invalid[target_idx[i] as usize] = false;
        }
    }

    // merge the incoming buffers into the remaining holes
    let y_lo = spec.limits_y[0];
    let n_tiles_x = spec.n_tiles_x;
    let Species {
        main, incoming, ..
    } = spec;
    for inc in incoming.iter_mut() {
        for k in 0..inc.size {
            let target_tile = tile_of(inc.ix[k], inc.iy[k], y_lo, n_tiles_x) as usize;
            let idx = source_counter[target_tile];
            source_counter[target_tile] += 1;
            let target = target_idx[idx as usize] as usize;
            main.ix[target] = inc.ix[k];
            main.iy[target] = inc.iy[k];
            main.x[target] = inc.x[k];
            main.y[target] = inc.y[k];
            main.ux[target] = inc.ux[k];
            main.uy[target] = inc.uy[k];
            main.uz[target] = inc.uz[k];
            main.invalid[target] = false;
        }
        inc.size = 0;
    }
}

/// Post-sort tile invariant, checked by the debug builds and the tests.
pub fn check_tiles(spec: &Species) -> bool {
    let n_tiles = spec.n_tiles_x * spec.n_tiles_y;
    let y_lo = spec.limits_y[0];
    if spec.tile_offset[n_tiles] as usize != spec.main.size {
        return false;
    }
    for t in 0..n_tiles {
        let begin = spec.tile_offset[t] as usize;
        let end = spec.tile_offset[t + 1] as usize;
        for k in begin..end {
            if spec.main.invalid[k] {
                return false;
            }
            if tile_of(spec.main.ix[k], spec.main.iy[k], y_lo, spec.n_tiles_x) != t as i32 {
                return false;
            }
        }
    }
    true
}
