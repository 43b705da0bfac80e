pub mod inpaint;
pub mod remove;
