use rand::Rng;

const LABEL_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// 无法读取文件描述符上限时使用的默认值
pub const DEFAULT_FD_LIMIT: u64 = 1024;

/// 生成长度为 n 的随机 DNS 标签（小写字母与数字）
pub fn random_label(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| LABEL_CHARS[rng.gen_range(0..LABEL_CHARS.len())] as char)
        .collect()
}

/// 当前进程的文件描述符软上限
#[cfg(unix)]
pub fn fd_limit() -> u64 {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit 只写入传入的结构体
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) };
    if rc != 0 || rlim.rlim_cur == libc::RLIM_INFINITY {
        return DEFAULT_FD_LIMIT;
    }
    rlim.rlim_cur as u64
}

#[cfg(not(unix))]
pub fn fd_limit() -> u64 {
    DEFAULT_FD_LIMIT
}

/// 按文件描述符上限计算可保留的解析器数量：floor(0.7 * limit)
pub fn max_resolvers_for(limit: u64) -> usize {
    (limit as f64 * 0.7).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_label() {
        let label = random_label(16);
        assert_eq!(label.len(), 16);
        assert!(label.bytes().all(|b| LABEL_CHARS.contains(&b)));
        assert_ne!(random_label(16), random_label(16));
    }

    #[test]
    fn test_max_resolvers() {
        assert_eq!(max_resolvers_for(1024), 716);
        assert_eq!(max_resolvers_for(10), 7);
        assert_eq!(max_resolvers_for(1), 0);
        assert!(fd_limit() > 0);
    }
}
